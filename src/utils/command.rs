/// Functions and structs for building and running external tool command lines

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::debug;
use tokio::process::Command;

use crate::config::defs::PipelineError;

/// Resolves an executable name against PATH without invoking it.
///
/// # Arguments
/// * `tool` - Bare executable name.
///
/// # Returns
/// Full path to the executable, or None if it does not resolve.
pub fn which(tool: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(tool);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Confirms every required tool resolves before any data is touched.
/// Tools are not invoked, only located.
pub fn check_tools(tools: &[&str]) -> Result<(), PipelineError> {
    for tool in tools {
        match which(tool) {
            Some(path) => debug!("Found {} at {}", tool, path.display()),
            None => return Err(PipelineError::MissingTool(tool.to_string())),
        }
    }
    Ok(())
}


/// Runs an external tool to completion with an explicit exit-code contract.
///
/// # Arguments
/// * `tool` - Executable name.
/// * `args` - Argument list, never shell-interpolated.
/// * `stdout_to` - Redirect stdout to this file when given, else discard.
/// * `log_to` - Redirect stderr to this file when given, else capture it
///   for the error report.
///
/// # Returns
/// Ok on exit status zero; ToolExecution otherwise.
pub async fn run_tool(
    tool: &str,
    args: &[String],
    stdout_to: Option<&Path>,
    log_to: Option<&Path>,
) -> Result<(), PipelineError> {
    debug!("{} {}", tool, args.join(" "));

    let mut cmd = Command::new(tool);
    cmd.args(args).stdin(Stdio::null());

    match stdout_to {
        Some(path) => {
            let file = File::create(path).map_err(|e| PipelineError::IOError(format!(
                "Failed to create {}: {}",
                path.display(),
                e
            )))?;
            cmd.stdout(Stdio::from(file));
        }
        None => {
            cmd.stdout(Stdio::null());
        }
    }

    let capture_stderr = log_to.is_none();
    match log_to {
        Some(path) => {
            let file = File::create(path).map_err(|e| PipelineError::IOError(format!(
                "Failed to create {}: {}",
                path.display(),
                e
            )))?;
            cmd.stderr(Stdio::from(file));
        }
        None => {
            cmd.stderr(Stdio::piped());
        }
    }

    let child = cmd.spawn().map_err(|e| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: format!("failed to spawn: {}", e),
    })?;

    let output = child.wait_with_output().await.map_err(|e| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: e.to_string(),
    })?;

    if !output.status.success() {
        let error = if capture_stderr {
            format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
        } else {
            format!("exit status {}", output.status)
        };
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error,
        });
    }

    Ok(())
}

/// Runs a tool and returns its captured stdout. Used for tools whose
/// contract is a scalar on standard output (read counting).
pub async fn run_tool_capture(tool: &str, args: &[String]) -> Result<String, PipelineError> {
    debug!("{} {}", tool, args.join(" "));

    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("failed to spawn: {}", e),
        })?;

    if !output.status.success() {
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}


pub mod fastp {
    use std::path::Path;

    /// Paired-end trimming: two FASTQs in, two cleaned FASTQs plus
    /// JSON/HTML reports out.
    pub fn arg_generator(
        r1: &Path,
        r2: &Path,
        out1: &Path,
        out2: &Path,
        json: &Path,
        html: &Path,
        quality: u8,
        threads: usize,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-i".to_string());
        args_vec.push(r1.to_string_lossy().to_string());
        args_vec.push("-I".to_string());
        args_vec.push(r2.to_string_lossy().to_string());
        args_vec.push("-o".to_string());
        args_vec.push(out1.to_string_lossy().to_string());
        args_vec.push("-O".to_string());
        args_vec.push(out2.to_string_lossy().to_string());
        args_vec.push("-j".to_string());
        args_vec.push(json.to_string_lossy().to_string());
        args_vec.push("-h".to_string());
        args_vec.push(html.to_string_lossy().to_string());
        args_vec.push("-q".to_string());
        args_vec.push(quality.to_string());
        args_vec.push("-w".to_string());
        args_vec.push(threads.to_string());
        args_vec
    }
}

pub mod bowtie2 {
    use std::path::Path;

    /// Paired-end alignment writing SAM via -S. Spike-in alignments use
    /// the stricter no-overlap/no-dovetail settings.
    pub fn arg_generator(
        index_prefix: &Path,
        r1: &Path,
        r2: &Path,
        sam_out: &Path,
        threads: usize,
        spikein: bool,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--end-to-end".to_string());
        args_vec.push("--very-sensitive".to_string());
        args_vec.push("--no-mixed".to_string());
        args_vec.push("--no-discordant".to_string());
        if spikein {
            args_vec.push("--no-overlap".to_string());
            args_vec.push("--no-dovetail".to_string());
        }
        args_vec.push("-I".to_string());
        args_vec.push("10".to_string());
        args_vec.push("-X".to_string());
        args_vec.push("700".to_string());
        args_vec.push("-p".to_string());
        args_vec.push(threads.to_string());
        args_vec.push("-x".to_string());
        args_vec.push(index_prefix.to_string_lossy().to_string());
        args_vec.push("-1".to_string());
        args_vec.push(r1.to_string_lossy().to_string());
        args_vec.push("-2".to_string());
        args_vec.push(r2.to_string_lossy().to_string());
        args_vec.push("-S".to_string());
        args_vec.push(sam_out.to_string_lossy().to_string());
        args_vec
    }
}

pub mod bowtie2_build {
    use std::path::Path;

    pub fn arg_generator(fasta: &Path, index_prefix: &Path, threads: usize) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--threads".to_string());
        args_vec.push(threads.to_string());
        args_vec.push(fasta.to_string_lossy().to_string());
        args_vec.push(index_prefix.to_string_lossy().to_string());
        args_vec
    }
}

pub mod samtools {
    use std::path::Path;
    use crate::config::defs::SamtoolsSubcommand;

    pub fn subcommand_tag(subcommand: SamtoolsSubcommand) -> &'static str {
        match subcommand {
            SamtoolsSubcommand::View => "view",
            SamtoolsSubcommand::Sort => "sort",
            SamtoolsSubcommand::Index => "index",
            SamtoolsSubcommand::Faidx => "faidx",
        }
    }

    pub fn faidx_args(fasta: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(subcommand_tag(SamtoolsSubcommand::Faidx).to_string());
        args_vec.push(fasta.to_string_lossy().to_string());
        args_vec
    }

    pub fn sort_args(input: &Path, output: &Path, threads: usize) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(subcommand_tag(SamtoolsSubcommand::Sort).to_string());
        args_vec.push("-@".to_string());
        args_vec.push(threads.to_string());
        args_vec.push("-o".to_string());
        args_vec.push(output.to_string_lossy().to_string());
        args_vec.push(input.to_string_lossy().to_string());
        args_vec
    }

    pub fn index_args(bam: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(subcommand_tag(SamtoolsSubcommand::Index).to_string());
        args_vec.push(bam.to_string_lossy().to_string());
        args_vec
    }

    /// Count records passing the exclusion flag on stdout.
    pub fn count_args(bam: &Path, exclude_flag: &str) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(subcommand_tag(SamtoolsSubcommand::View).to_string());
        args_vec.push("-c".to_string());
        args_vec.push("-F".to_string());
        args_vec.push(exclude_flag.to_string());
        args_vec.push(bam.to_string_lossy().to_string());
        args_vec
    }
}

pub mod picard {
    use std::path::Path;

    pub fn mark_duplicates_args(input: &Path, output: &Path, metrics: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("MarkDuplicates".to_string());
        args_vec.push("-I".to_string());
        args_vec.push(input.to_string_lossy().to_string());
        args_vec.push("-O".to_string());
        args_vec.push(output.to_string_lossy().to_string());
        args_vec.push("-M".to_string());
        args_vec.push(metrics.to_string_lossy().to_string());
        args_vec.push("--REMOVE_DUPLICATES".to_string());
        args_vec.push("true".to_string());
        args_vec
    }
}

pub mod seqtk {
    use std::path::Path;

    /// Fractional subsampling on stdout. The seed must match across
    /// anything that needs a reproducible draw.
    pub fn sample_args(fastq: &Path, fraction: &str, seed: u64) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("sample".to_string());
        args_vec.push("-s".to_string());
        args_vec.push(seed.to_string());
        args_vec.push(fastq.to_string_lossy().to_string());
        args_vec.push(fraction.to_string());
        args_vec
    }
}

pub mod seqkit {
    use std::path::Path;

    /// Select mates by read identifier to keep the subsampled pair
    /// consistent.
    pub fn grep_args(ids: &Path, fastq: &Path, out: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("grep".to_string());
        args_vec.push("-f".to_string());
        args_vec.push(ids.to_string_lossy().to_string());
        args_vec.push(fastq.to_string_lossy().to_string());
        args_vec.push("-o".to_string());
        args_vec.push(out.to_string_lossy().to_string());
        args_vec
    }
}

pub mod bamcoverage {
    use std::path::Path;

    pub fn arg_generator(
        bam: &Path,
        out_bigwig: &Path,
        bin_size: usize,
        genome_size: u64,
        threads: usize,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-b".to_string());
        args_vec.push(bam.to_string_lossy().to_string());
        args_vec.push("-o".to_string());
        args_vec.push(out_bigwig.to_string_lossy().to_string());
        args_vec.push("--binSize".to_string());
        args_vec.push(bin_size.to_string());
        args_vec.push("--normalizeUsing".to_string());
        args_vec.push("RPGC".to_string());
        args_vec.push("--effectiveGenomeSize".to_string());
        args_vec.push(genome_size.to_string());
        args_vec.push("--extendReads".to_string());
        args_vec.push("-p".to_string());
        args_vec.push(threads.to_string());
        args_vec
    }
}

pub mod macs2 {
    use std::path::Path;

    pub fn callpeak_args(
        treat_bam: &Path,
        control_bam: &Path,
        genome_size: u64,
        name: &str,
        out_dir: &Path,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("callpeak".to_string());
        args_vec.push("-t".to_string());
        args_vec.push(treat_bam.to_string_lossy().to_string());
        args_vec.push("-c".to_string());
        args_vec.push(control_bam.to_string_lossy().to_string());
        args_vec.push("-f".to_string());
        args_vec.push("BAMPE".to_string());
        args_vec.push("-g".to_string());
        args_vec.push(genome_size.to_string());
        args_vec.push("-n".to_string());
        args_vec.push(name.to_string());
        args_vec.push("--outdir".to_string());
        args_vec.push(out_dir.to_string_lossy().to_string());
        args_vec.push("-q".to_string());
        args_vec.push("0.05".to_string());
        args_vec.push("--keep-dup".to_string());
        args_vec.push("all".to_string());
        args_vec
    }
}

pub mod bedtools {
    use std::path::Path;

    /// Joined annotation table on stdout: every peak row paired with every
    /// overlapping annotation row.
    pub fn intersect_args(peaks: &Path, annotation: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("intersect".to_string());
        args_vec.push("-a".to_string());
        args_vec.push(peaks.to_string_lossy().to_string());
        args_vec.push("-b".to_string());
        args_vec.push(annotation.to_string_lossy().to_string());
        args_vec.push("-wa".to_string());
        args_vec.push("-wb".to_string());
        args_vec
    }
}

pub mod deeptools {
    use std::path::Path;

    pub fn compute_matrix_args(
        tss_bed: &Path,
        bigwigs: &[&Path],
        out_matrix: &Path,
        flank: usize,
        threads: usize,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("reference-point".to_string());
        args_vec.push("--referencePoint".to_string());
        args_vec.push("TSS".to_string());
        args_vec.push("-R".to_string());
        args_vec.push(tss_bed.to_string_lossy().to_string());
        args_vec.push("-S".to_string());
        for bw in bigwigs {
            args_vec.push(bw.to_string_lossy().to_string());
        }
        args_vec.push("-b".to_string());
        args_vec.push(flank.to_string());
        args_vec.push("-a".to_string());
        args_vec.push(flank.to_string());
        args_vec.push("--skipZeros".to_string());
        args_vec.push("-o".to_string());
        args_vec.push(out_matrix.to_string_lossy().to_string());
        args_vec.push("-p".to_string());
        args_vec.push(threads.to_string());
        args_vec
    }

    pub fn plot_heatmap_args(matrix: &Path, out_png: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-m".to_string());
        args_vec.push(matrix.to_string_lossy().to_string());
        args_vec.push("-o".to_string());
        args_vec.push(out_png.to_string_lossy().to_string());
        args_vec
    }

    pub fn plot_profile_args(matrix: &Path, out_png: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-m".to_string());
        args_vec.push(matrix.to_string_lossy().to_string());
        args_vec.push("-o".to_string());
        args_vec.push(out_png.to_string_lossy().to_string());
        args_vec
    }
}

pub mod homer {
    use std::path::Path;

    pub fn motif_args(
        peaks: &Path,
        genome_fasta: &Path,
        out_dir: &Path,
        size: usize,
        threads: usize,
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(peaks.to_string_lossy().to_string());
        args_vec.push(genome_fasta.to_string_lossy().to_string());
        args_vec.push(out_dir.to_string_lossy().to_string());
        args_vec.push("-size".to_string());
        args_vec.push(size.to_string());
        args_vec.push("-p".to_string());
        args_vec.push(threads.to_string());
        args_vec
    }
}
