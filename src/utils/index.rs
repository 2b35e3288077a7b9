/// Idempotent provisioning of derived index artifacts. Existence of the
/// artifact is the only freshness check: an index built from an older
/// FASTA/annotation is silently reused unless `force` is set.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::defs::{BOWTIE2_BUILD_TAG, PipelineError, SAMTOOLS_TAG};
use crate::utils::annotation::derive_tss_bed;
use crate::utils::command::{bowtie2_build, run_tool, samtools};
use crate::utils::file::append_ext;

/// Ensures the sequence index (`<fasta>.fai`) exists, building it if
/// absent. Safe to call every run.
pub async fn ensure_faidx(fasta: &Path, force: bool) -> Result<PathBuf, PipelineError> {
    let fai = append_ext(fasta, "fai");
    if fai.exists() && !force {
        debug!("Reusing sequence index {}", fai.display());
        return Ok(fai);
    }

    info!("Building sequence index for {}", fasta.display());
    run_tool(SAMTOOLS_TAG, &samtools::faidx_args(fasta), None, None)
        .await
        .map_err(|e| PipelineError::IndexBuild {
            path: fasta.to_string_lossy().to_string(),
            error: e.to_string(),
        })?;

    if !fai.exists() {
        return Err(PipelineError::IndexBuild {
            path: fasta.to_string_lossy().to_string(),
            error: "index file missing after build".to_string(),
        });
    }
    Ok(fai)
}

/// Ensures the aligner index exists for a FASTA, keyed on the first index
/// shard (`<fasta>.1.bt2`). Identical for the target genome and the
/// spike-in genome; the FASTA path doubles as the index prefix.
pub async fn ensure_bowtie2_index(
    fasta: &Path,
    threads: usize,
    force: bool,
) -> Result<PathBuf, PipelineError> {
    let prefix = fasta.to_path_buf();
    let first_shard = append_ext(&prefix, "1.bt2");
    if first_shard.exists() && !force {
        debug!("Reusing aligner index {}", prefix.display());
        return Ok(prefix);
    }

    info!("Building aligner index for {}", fasta.display());
    run_tool(
        BOWTIE2_BUILD_TAG,
        &bowtie2_build::arg_generator(fasta, &prefix, threads),
        None,
        None,
    )
    .await
    .map_err(|e| PipelineError::IndexBuild {
        path: fasta.to_string_lossy().to_string(),
        error: e.to_string(),
    })?;

    Ok(prefix)
}

/// Ensures the TSS coordinate file derived from the annotation exists.
pub fn ensure_tss_bed(
    annotation: &Path,
    out: &Path,
    force: bool,
) -> Result<PathBuf, PipelineError> {
    if out.exists() && !force {
        debug!("Reusing TSS coordinates {}", out.display());
        return Ok(out.to_path_buf());
    }

    info!("Deriving TSS coordinates from {}", annotation.display());
    let n = derive_tss_bed(annotation, out).map_err(|e| PipelineError::IndexBuild {
        path: annotation.to_string_lossy().to_string(),
        error: e.to_string(),
    })?;
    info!("Wrote {} TSS records to {}", n, out.display());
    Ok(out.to_path_buf())
}

/// Total genome size from the sequence index: the sum of the length
/// column.
pub fn genome_size_from_fai(fai: &Path) -> Result<u64, PipelineError> {
    let body = fs::read_to_string(fai)
        .map_err(|e| PipelineError::IOError(format!("Cannot read {}: {}", fai.display(), e)))?;

    let mut total: u64 = 0;
    for (lineno, line) in body.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let length = line
            .split('\t')
            .nth(1)
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "Malformed sequence index {} at line {}",
                    fai.display(),
                    lineno + 1
                ))
            })?;
        total += length;
    }

    if total == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "Sequence index {} reports a zero-length genome",
            fai.display()
        )));
    }
    Ok(total)
}
