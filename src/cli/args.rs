use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "cuttag-pipelines", version, about = "Checkpointed Cut&Tag processing pipeline")]
pub struct Arguments {

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'i', long = "treat-r1", required = true, help = "Treatment R1 FASTQ")]
    pub treat_r1: String,

    #[arg(short = 'I', long = "treat-r2", required = true, help = "Treatment R2 FASTQ")]
    pub treat_r2: String,

    #[arg(short = 'c', long = "ctrl-r1", required = true, help = "Control (IgG) R1 FASTQ")]
    pub ctrl_r1: String,

    #[arg(short = 'C', long = "ctrl-r2", required = true, help = "Control (IgG) R2 FASTQ")]
    pub ctrl_r2: String,

    #[arg(short = 'p', long = "prefix", required = true, help = "Output prefix used for all generated files and checkpoints")]
    pub prefix: String,

    #[arg(short = 'g', long = "genome", required = true, help = "Target genome FASTA")]
    pub genome: String,

    #[arg(short = 'a', long = "annotation", required = true, help = "Target genome annotation (GFF/GFF3, optionally gzipped)")]
    pub annotation: String,

    #[arg(short = 's', long = "spikein", required = true, help = "Spike-in genome FASTA (e.g. E. coli)")]
    pub spikein: String,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files. If not specified, a directory named '<prefix>_YYYYMMDD' will be created in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(long, default_value_t = 8)]
    pub threads: usize,

    #[clap(long, help = "Optional fixed seed for subsampling reproducibility; defaults to OS entropy")]
    pub seed: Option<u64>,

    #[arg(short = 'q', long = "quality", default_value_t = 20)]
    pub quality: u8,

    #[arg(long = "bin-size", default_value_t = 10, help = "Bin size for coverage tracks")]
    pub bin_size: usize,

    #[arg(long = "flank", default_value_t = 3000, help = "Bases up/downstream of the TSS in metaplot windows")]
    pub flank: usize,

    #[arg(long = "motif-size", default_value_t = 200, help = "Region size for motif discovery")]
    pub motif_size: usize,

    #[arg(long = "rebuild-indexes", default_value_t = false, help = "Rebuild derived indexes even when their files already exist")]
    pub rebuild_indexes: bool,
}
