/// Read-identifier extraction for mate-consistent subsampling: the ids of
/// the subsampled R1 drive the mate selector on R2.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Result, anyhow};
use flate2::read::MultiGzDecoder;
use seq_io::fastq::{Reader, Record};

use crate::utils::file::is_gzipped;

/// Writes one read id per FASTQ record, with any `/1` or `/2` mate suffix
/// stripped so the list matches both mates.
///
/// # Arguments
/// * `fastq` - Input FASTQ, plain or gzipped.
/// * `out` - Destination id list, one id per line.
///
/// # Returns
/// Number of ids written.
pub fn write_read_ids(fastq: &Path, out: &Path) -> Result<u64> {
    let file = File::open(fastq)
        .map_err(|e| anyhow!("Cannot open FASTQ {}: {}", fastq.display(), e))?;
    let reader: Box<dyn Read> = if is_gzipped(fastq)? {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut fq_reader = Reader::new(BufReader::new(reader));
    let mut writer = BufWriter::new(File::create(out)?);
    let mut count: u64 = 0;

    while let Some(record) = fq_reader.next() {
        let record = record
            .map_err(|e| anyhow!("Invalid FASTQ record in {}: {}", fastq.display(), e))?;
        let id = record
            .id()
            .map_err(|e| anyhow!("Non-UTF8 read id in {}: {}", fastq.display(), e))?;
        let id = id
            .strip_suffix("/1")
            .or_else(|| id.strip_suffix("/2"))
            .unwrap_or(id);
        writeln!(writer, "{}", id)?;
        count += 1;
    }

    writer.flush()?;
    Ok(count)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ids_extracted_and_mate_suffix_stripped() -> Result<()> {
        let tmp = TempDir::new()?;
        let fastq_path = tmp.path().join("reads.fastq");
        std::fs::write(
            &fastq_path,
            "@read1/1\nACGT\n+\nIIII\n@read2/1 extra desc\nACGT\n+\nIIII\n",
        )?;
        let ids_path = tmp.path().join("ids.txt");
        let n = write_read_ids(&fastq_path, &ids_path)?;
        assert_eq!(n, 2);
        let ids = std::fs::read_to_string(&ids_path)?;
        assert_eq!(ids, "read1\nread2\n");
        Ok(())
    }

    #[test]
    fn test_gzipped_input() -> Result<()> {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let tmp = TempDir::new()?;
        let fastq_path = tmp.path().join("reads.fastq.gz");
        let mut encoder =
            GzEncoder::new(File::create(&fastq_path)?, Compression::default());
        encoder.write_all(b"@read1\nACGT\n+\nIIII\n")?;
        encoder.finish()?;

        let ids_path = tmp.path().join("ids.txt");
        let n = write_read_ids(&fastq_path, &ids_path)?;
        assert_eq!(n, 1);
        assert_eq!(std::fs::read_to_string(&ids_path)?, "read1\n");
        Ok(())
    }

    #[test]
    fn test_truncated_record_is_error() -> Result<()> {
        let tmp = TempDir::new()?;
        let fastq_path = tmp.path().join("bad.fastq");
        std::fs::write(&fastq_path, "@read1\nACGT\n")?;
        let ids_path = tmp.path().join("ids.txt");
        assert!(write_read_ids(&fastq_path, &ids_path).is_err());
        Ok(())
    }
}
