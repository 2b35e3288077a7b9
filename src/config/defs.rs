use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use thiserror::Error;

use crate::cli::Arguments;

// External software
pub const FASTP_TAG: &str = "fastp";
pub const BOWTIE2_TAG: &str = "bowtie2";
pub const BOWTIE2_BUILD_TAG: &str = "bowtie2-build";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const PICARD_TAG: &str = "picard";
pub const SEQTK_TAG: &str = "seqtk";
pub const SEQKIT_TAG: &str = "seqkit";
pub const BAMCOVERAGE_TAG: &str = "bamCoverage";
pub const MACS2_TAG: &str = "macs2";
pub const BEDTOOLS_TAG: &str = "bedtools";
pub const COMPUTEMATRIX_TAG: &str = "computeMatrix";
pub const PLOTHEATMAP_TAG: &str = "plotHeatmap";
pub const PLOTPROFILE_TAG: &str = "plotProfile";
pub const HOMER_MOTIF_TAG: &str = "findMotifsGenome.pl";

pub const REQUIRED_TOOLS: &[&str] = &[
    FASTP_TAG,
    BOWTIE2_TAG,
    BOWTIE2_BUILD_TAG,
    SAMTOOLS_TAG,
    PICARD_TAG,
    SEQTK_TAG,
    SEQKIT_TAG,
    BAMCOVERAGE_TAG,
    MACS2_TAG,
    BEDTOOLS_TAG,
    COMPUTEMATRIX_TAG,
    PLOTHEATMAP_TAG,
    PLOTPROFILE_TAG,
    HOMER_MOTIF_TAG,
];

lazy_static! {
    // Feature types that carry a usable transcription start site.
    pub static ref GENE_LIKE_FEATURES: Vec<&'static str> = vec![
        "gene", "transcript", "mRNA", "lncRNA", "miRNA", "rRNA", "tRNA",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    View,
    Sort,
    Index,
    Faidx,
}

// Static Filenames
pub const TSS_BED: &str = "tss.bed";

// SAM flag: read unmapped.
pub const FLAG_UNMAPPED: &str = "0x04";


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Required tool not found on PATH: {0}")]
    MissingTool(String),
    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },
    #[error("IO error: {0}")]
    IOError(String),
    #[error("Index build failed for {path}: {error}")]
    IndexBuild { path: String, error: String },
    #[error("Spike-in read count for {role} sample is zero; cannot compute scale factors")]
    ZeroSpikeinCount { role: SampleRole },
    #[error("Stage {stage} failed: {errors}")]
    StageFailed { stage: String, errors: String },
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRole {
    Treatment,
    Control,
}

impl SampleRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleRole::Treatment => "treatment",
            SampleRole::Control => "control",
        }
    }
}

impl fmt::Display for SampleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two symmetric pipeline inputs. Structurally immutable after
/// startup; only its artifact files accumulate as stages complete.
#[derive(Debug, Clone)]
pub struct Sample {
    pub role: SampleRole,
    pub r1: PathBuf,
    pub r2: PathBuf,
    pub name: String,
}

impl Sample {
    pub fn new(role: SampleRole, r1: PathBuf, r2: PathBuf, prefix: &str) -> Self {
        let name = format!("{}_{}", prefix, role.as_str());
        Sample { role, r1, r2, name }
    }

    pub fn trimmed_r1(&self, dirs: &OutDirs) -> PathBuf {
        dirs.qc.join(format!("{}_trimmed_R1.fastq.gz", self.name))
    }

    pub fn trimmed_r2(&self, dirs: &OutDirs) -> PathBuf {
        dirs.qc.join(format!("{}_trimmed_R2.fastq.gz", self.name))
    }

    pub fn fastp_json(&self, dirs: &OutDirs) -> PathBuf {
        dirs.qc.join(format!("{}_fastp.json", self.name))
    }

    pub fn fastp_html(&self, dirs: &OutDirs) -> PathBuf {
        dirs.qc.join(format!("{}_fastp.html", self.name))
    }

    pub fn spikein_sam(&self, dirs: &OutDirs) -> PathBuf {
        dirs.spikein.join(format!("{}_spikein.sam", self.name))
    }

    pub fn spikein_bam(&self, dirs: &OutDirs) -> PathBuf {
        dirs.spikein.join(format!("{}_spikein.sorted.bam", self.name))
    }

    pub fn subsampled_r1(&self, dirs: &OutDirs) -> PathBuf {
        dirs.normalized.join(format!("{}_norm_R1.fastq", self.name))
    }

    pub fn subsampled_r2(&self, dirs: &OutDirs) -> PathBuf {
        dirs.normalized.join(format!("{}_norm_R2.fastq", self.name))
    }

    pub fn subsampled_ids(&self, dirs: &OutDirs) -> PathBuf {
        dirs.normalized.join(format!("{}_norm_ids.txt", self.name))
    }

    pub fn genome_sam(&self, dirs: &OutDirs) -> PathBuf {
        dirs.alignment.join(format!("{}.sam", self.name))
    }

    pub fn genome_bam(&self, dirs: &OutDirs) -> PathBuf {
        dirs.alignment.join(format!("{}.sorted.bam", self.name))
    }

    pub fn dedup_bam(&self, dirs: &OutDirs) -> PathBuf {
        dirs.alignment.join(format!("{}.dedup.bam", self.name))
    }

    pub fn dedup_metrics(&self, dirs: &OutDirs) -> PathBuf {
        dirs.alignment.join(format!("{}.dedup_metrics.txt", self.name))
    }

    pub fn coverage_bigwig(&self, dirs: &OutDirs) -> PathBuf {
        dirs.coverage.join(format!("{}.bw", self.name))
    }
}


/// Fixed stage order of the pipeline. Stage numbers are part of the
/// checkpoint file names and must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Qc,
    SpikeinAlign,
    GenomeProcess,
    PeakCall,
    Annotate,
    Metaplot,
    Motif,
}

impl PipelineStage {
    pub fn number(&self) -> u8 {
        match self {
            PipelineStage::Qc => 1,
            PipelineStage::SpikeinAlign => 2,
            PipelineStage::GenomeProcess => 3,
            PipelineStage::PeakCall => 4,
            PipelineStage::Annotate => 5,
            PipelineStage::Metaplot => 6,
            PipelineStage::Motif => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Qc => "qc",
            PipelineStage::SpikeinAlign => "spikein_align",
            PipelineStage::GenomeProcess => "genome_process",
            PipelineStage::PeakCall => "peak_call",
            PipelineStage::Annotate => "annotate",
            PipelineStage::Metaplot => "metaplot",
            PipelineStage::Motif => "motif",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// In-memory model of a stage's checkpoint. Completion is binary: a stage
/// is Done iff its marker file exists, never partially done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Done,
}


/// Output directory layout: one subdirectory per stage category.
#[derive(Debug, Clone)]
pub struct OutDirs {
    pub root: PathBuf,
    pub qc: PathBuf,
    pub spikein: PathBuf,
    pub normalized: PathBuf,
    pub alignment: PathBuf,
    pub coverage: PathBuf,
    pub peaks: PathBuf,
    pub annotation: PathBuf,
    pub metaplot: PathBuf,
    pub motif: PathBuf,
    pub checkpoints: PathBuf,
}

impl OutDirs {
    pub fn new(root: &Path) -> Self {
        OutDirs {
            root: root.to_path_buf(),
            qc: root.join("qc"),
            spikein: root.join("spikein"),
            normalized: root.join("normalized"),
            alignment: root.join("alignment"),
            coverage: root.join("coverage"),
            peaks: root.join("peaks"),
            annotation: root.join("annotation"),
            metaplot: root.join("metaplot"),
            motif: root.join("motif"),
            checkpoints: root.join("checkpoints"),
        }
    }

    pub fn create_all(&self) -> io::Result<()> {
        for dir in [
            &self.root,
            &self.qc,
            &self.spikein,
            &self.normalized,
            &self.alignment,
            &self.coverage,
            &self.peaks,
            &self.annotation,
            &self.metaplot,
            &self.motif,
            &self.checkpoints,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}


pub struct RunConfig {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub dirs: OutDirs,
    pub args: Arguments,
    pub threads: usize,
    pub seed: u64,
}
