/// TSS coordinate derivation from GFF-style annotation files. This is the
/// one piece of in-crate parsing: everything else in the annotation space
/// is delegated to external tools.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Result, anyhow};
use flate2::read::MultiGzDecoder;
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::defs::GENE_LIKE_FEATURES;
use crate::utils::file::is_gzipped;

lazy_static! {
    static ref WS_RUN: Regex = Regex::new(r"[ \t\r\n]+").unwrap();
}

/// One zero-length interval at a transcription start site, BED-style
/// half-open coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TssRecord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub attributes: String,
    pub strand: char,
}

impl TssRecord {
    fn sort_key(&self) -> (&str, u64, u64, char) {
        (self.chrom.as_str(), self.start, self.end, self.strand)
    }
}

/// Scans annotation lines for gene-like features and emits one sanitized
/// TSS record per feature. The sanitization order is load-bearing on
/// malformed inputs and must not be rearranged:
///
/// 1. comment lines and records with fewer than 9 fields are skipped;
/// 2. all whitespace is stripped from the chromosome and strand fields;
/// 3. whitespace/newline/CR runs inside the attributes field collapse to
///    single semicolons, keeping the output one record per line;
/// 4. the TSS interval is (start-1, start) on `+` and (end-1, end) on `-`;
///    any strand other than exactly `+`/`-` after sanitization drops the
///    record silently, as do unparseable coordinates;
/// 5. records are deduplicated on (chrom, start, end, strand) and sorted
///    by chrom, start, end, strand.
pub fn extract_tss<R: BufRead>(input: R) -> Result<Vec<TssRecord>> {
    let mut records: Vec<TssRecord> = Vec::new();

    for line in input.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            continue;
        }
        if !GENE_LIKE_FEATURES.contains(&fields[2]) {
            continue;
        }

        let chrom: String = fields[0].split_whitespace().collect();
        let strand: String = fields[6].split_whitespace().collect();
        let attributes = WS_RUN.replace_all(fields[8], ";").to_string();

        let strand = match strand.as_str() {
            "+" => '+',
            "-" => '-',
            _ => continue,
        };
        let start: u64 = match fields[3].trim().parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let end: u64 = match fields[4].trim().parse() {
            Ok(v) => v,
            Err(_) => continue,
        };

        // GFF is 1-based; a zero coordinate cannot anchor a TSS interval.
        let (tss_start, tss_end) = match strand {
            '+' => match start.checked_sub(1) {
                Some(s) => (s, start),
                None => continue,
            },
            _ => match end.checked_sub(1) {
                Some(s) => (s, end),
                None => continue,
            },
        };

        records.push(TssRecord {
            chrom,
            start: tss_start,
            end: tss_end,
            attributes,
            strand,
        });
    }

    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    records.dedup_by(|a, b| a.sort_key() == b.sort_key());
    Ok(records)
}

/// Derives the TSS coordinate file from a plain or gzipped annotation.
///
/// # Returns
/// Number of records written.
pub fn derive_tss_bed(annotation: &Path, out: &Path) -> Result<usize> {
    let file = File::open(annotation)
        .map_err(|e| anyhow!("Cannot open annotation {}: {}", annotation.display(), e))?;
    let reader: Box<dyn Read> = if is_gzipped(annotation)? {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let records = extract_tss(BufReader::new(reader))?;
    if records.is_empty() {
        return Err(anyhow!(
            "No gene-like features found in {}",
            annotation.display()
        ));
    }

    let mut writer = BufWriter::new(File::create(out)?);
    for rec in &records {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t.\t{}",
            rec.chrom, rec.start, rec.end, rec.attributes, rec.strand
        )?;
    }
    writer.flush()?;
    Ok(records.len())
}
