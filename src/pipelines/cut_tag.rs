use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, info};

use crate::config::defs::{
    BAMCOVERAGE_TAG, BEDTOOLS_TAG, BOWTIE2_TAG, COMPUTEMATRIX_TAG, FASTP_TAG, FLAG_UNMAPPED,
    HOMER_MOTIF_TAG, MACS2_TAG, PICARD_TAG, PLOTHEATMAP_TAG, PLOTPROFILE_TAG, PipelineError,
    PipelineStage, REQUIRED_TOOLS, RunConfig, SAMTOOLS_TAG, SEQKIT_TAG, SEQTK_TAG, Sample,
    SampleRole, TSS_BED,
};
use crate::utils::checkpoint::CheckpointStore;
use crate::utils::command::{
    bamcoverage, bedtools, bowtie2, check_tools, deeptools, fastp, homer, macs2, picard,
    run_tool, run_tool_capture, samtools, seqkit, seqtk,
};
use crate::utils::fastq::write_read_ids;
use crate::utils::file::absolutize;
use crate::utils::index::{ensure_bowtie2_index, ensure_faidx, ensure_tss_bed, genome_size_from_fai};
use crate::utils::normalize::{format_factor, scale_factors};
use crate::utils::stage::{run_paired_stage, run_stage};

/// Run function for the Cut&Tag pipeline: fixed forward-only stage order,
/// resumable via checkpoints.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    // External tools check before any data is touched
    check_tools(REQUIRED_TOOLS)?;

    config.dirs.create_all()?;
    let store = CheckpointStore::new(&config.dirs.checkpoints, &config.args.prefix);

    let genome_fasta = required_input(&config, &config.args.genome, "genome FASTA (-g)")?;
    let spikein_fasta = required_input(&config, &config.args.spikein, "spike-in FASTA (-s)")?;
    let annotation = required_input(&config, &config.args.annotation, "annotation (-a)")?;

    let treat = Sample::new(
        SampleRole::Treatment,
        required_input(&config, &config.args.treat_r1, "treatment R1 (-i)")?,
        required_input(&config, &config.args.treat_r2, "treatment R2 (-I)")?,
        &config.args.prefix,
    );
    let ctrl = Sample::new(
        SampleRole::Control,
        required_input(&config, &config.args.ctrl_r1, "control R1 (-c)")?,
        required_input(&config, &config.args.ctrl_r2, "control R2 (-C)")?,
        &config.args.prefix,
    );

    // Index provisioning, idempotent across runs
    let force = config.args.rebuild_indexes;
    let fai = ensure_faidx(&genome_fasta, force).await?;
    let genome_size = genome_size_from_fai(&fai)?;
    info!("Target genome size: {} bp", genome_size);
    let genome_index = ensure_bowtie2_index(&genome_fasta, config.threads, force).await?;
    let spikein_index = ensure_bowtie2_index(&spikein_fasta, config.threads, force).await?;
    let tss_bed = ensure_tss_bed(&annotation, &config.dirs.annotation.join(TSS_BED), force)?;

    // Stage 1: QC / adapter trimming, both samples in parallel
    run_paired_stage(
        &store,
        PipelineStage::Qc,
        qc_sample(config.clone(), treat.clone()),
        qc_sample(config.clone(), ctrl.clone()),
    )
    .await?;

    // Stage 2: spike-in alignment and read counting, both samples in
    // parallel. A skipped stage recovers the counts from the cache.
    let (treat_count, ctrl_count) = match run_paired_stage(
        &store,
        PipelineStage::SpikeinAlign,
        spikein_sample(config.clone(), treat.clone(), spikein_index.clone(), store.clone()),
        spikein_sample(config.clone(), ctrl.clone(), spikein_index.clone(), store.clone()),
    )
    .await?
    {
        Some(counts) => counts,
        None => (
            store.cached_count(SampleRole::Treatment)?,
            store.cached_count(SampleRole::Control)?,
        ),
    };
    info!(
        "Spike-in read counts: treatment={}, control={}",
        treat_count, ctrl_count
    );

    // Zero counts are fatal here, before any genome-stage work begins
    let (factor_treat, factor_ctrl) = scale_factors(treat_count, ctrl_count)?;
    info!(
        "Scale factors: treatment={}, control={}",
        format_factor(factor_treat),
        format_factor(factor_ctrl)
    );

    // Stage 3: subsample to equal spike-in depth, align to the target
    // genome, deduplicate, render coverage; both samples in parallel
    run_paired_stage(
        &store,
        PipelineStage::GenomeProcess,
        genome_sample(config.clone(), treat.clone(), genome_index.clone(), genome_size, factor_treat),
        genome_sample(config.clone(), ctrl.clone(), genome_index.clone(), genome_size, factor_ctrl),
    )
    .await?;

    // Stage 4: peak calling, treatment vs control
    let narrow_peak = config
        .dirs
        .peaks
        .join(format!("{}_peaks.narrowPeak", config.args.prefix));
    run_stage(
        &store,
        PipelineStage::PeakCall,
        call_peaks(config.clone(), &treat, &ctrl, genome_size),
    )
    .await?;

    // Stage 5: peak annotation
    run_stage(
        &store,
        PipelineStage::Annotate,
        annotate_peaks(config.clone(), &narrow_peak, &annotation),
    )
    .await?;

    // Stage 6: metaplot around TSSs
    run_stage(
        &store,
        PipelineStage::Metaplot,
        metaplot(config.clone(), &treat, &ctrl, &tss_bed),
    )
    .await?;

    // Stage 7: motif discovery
    run_stage(
        &store,
        PipelineStage::Motif,
        discover_motifs(config.clone(), &narrow_peak, &genome_fasta),
    )
    .await?;

    println!("Finished Cut&Tag pipeline.");
    Ok(())
}

/// Resolves a CLI-supplied input against the working directory and
/// requires it to exist.
fn required_input(
    config: &RunConfig,
    raw: &str,
    what: &str,
) -> Result<PathBuf, PipelineError> {
    let path = absolutize(Path::new(raw), &config.cwd);
    if !path.exists() {
        return Err(PipelineError::InvalidConfig(format!(
            "Cannot find {}: {}",
            what,
            path.display()
        )));
    }
    Ok(path)
}

/// Trims one sample's read pair. Reports land next to the trimmed reads.
async fn qc_sample(config: Arc<RunConfig>, sample: Sample) -> Result<(), PipelineError> {
    let dirs = &config.dirs;
    let args = fastp::arg_generator(
        &sample.r1,
        &sample.r2,
        &sample.trimmed_r1(dirs),
        &sample.trimmed_r2(dirs),
        &sample.fastp_json(dirs),
        &sample.fastp_html(dirs),
        config.args.quality,
        config.threads,
    );
    let log_path = dirs.qc.join(format!("{}_fastp.log", sample.name));
    run_tool(FASTP_TAG, &args, None, Some(&log_path)).await?;
    info!("{}: trimming complete", sample.name);
    Ok(())
}

/// Aligns one sample's trimmed reads to the spike-in genome, counts the
/// mapped reads, and caches the count for resumed runs.
async fn spikein_sample(
    config: Arc<RunConfig>,
    sample: Sample,
    index: PathBuf,
    store: CheckpointStore,
) -> Result<u64, PipelineError> {
    let dirs = &config.dirs;
    let sam = sample.spikein_sam(dirs);
    let bam = sample.spikein_bam(dirs);
    let log_path = dirs.spikein.join(format!("{}_bowtie2.log", sample.name));

    run_tool(
        BOWTIE2_TAG,
        &bowtie2::arg_generator(
            &index,
            &sample.trimmed_r1(dirs),
            &sample.trimmed_r2(dirs),
            &sam,
            config.threads,
            true,
        ),
        None,
        Some(&log_path),
    )
    .await?;

    run_tool(SAMTOOLS_TAG, &samtools::sort_args(&sam, &bam, config.threads), None, None).await?;
    fs::remove_file(&sam)?;
    run_tool(SAMTOOLS_TAG, &samtools::index_args(&bam), None, None).await?;

    let stdout = run_tool_capture(SAMTOOLS_TAG, &samtools::count_args(&bam, FLAG_UNMAPPED)).await?;
    let count: u64 = stdout.trim().parse().map_err(|e| {
        PipelineError::ToolExecution {
            tool: SAMTOOLS_TAG.to_string(),
            error: format!("unparseable read count {:?}: {}", stdout.trim(), e),
        }
    })?;

    store.cache_count(sample.role, count)?;
    info!("{}: {} reads aligned to spike-in", sample.name, count);
    Ok(count)
}

/// One sample's genome-side processing: subsample to the normalization
/// factor, align, sort, deduplicate, and render the coverage track. Steps
/// within a sample are strictly sequential.
async fn genome_sample(
    config: Arc<RunConfig>,
    sample: Sample,
    index: PathBuf,
    genome_size: u64,
    factor: f64,
) -> Result<(), PipelineError> {
    let dirs = &config.dirs;

    let (r1, r2) = if factor >= 1.0 {
        debug!("{}: factor 1.0, subsampling skipped", sample.name);
        (sample.trimmed_r1(dirs), sample.trimmed_r2(dirs))
    } else {
        let norm_r1 = sample.subsampled_r1(dirs);
        let norm_r2 = sample.subsampled_r2(dirs);
        let ids = sample.subsampled_ids(dirs);

        run_tool(
            SEQTK_TAG,
            &seqtk::sample_args(&sample.trimmed_r1(dirs), &format_factor(factor), config.seed),
            Some(&norm_r1),
            None,
        )
        .await?;

        // Mate selection by id keeps the pair consistent
        let (src, dst) = (norm_r1.clone(), ids.clone());
        let n = tokio::task::spawn_blocking(move || write_read_ids(&src, &dst))
            .await
            .map_err(|e| PipelineError::Other(anyhow!("id extraction task failed: {}", e)))??;
        debug!("{}: kept {} read pairs after subsampling", sample.name, n);

        run_tool(
            SEQKIT_TAG,
            &seqkit::grep_args(&ids, &sample.trimmed_r2(dirs), &norm_r2),
            None,
            None,
        )
        .await?;

        (norm_r1, norm_r2)
    };

    let sam = sample.genome_sam(dirs);
    let bam = sample.genome_bam(dirs);
    let log_path = dirs.alignment.join(format!("{}_bowtie2.log", sample.name));
    run_tool(
        BOWTIE2_TAG,
        &bowtie2::arg_generator(&index, &r1, &r2, &sam, config.threads, false),
        None,
        Some(&log_path),
    )
    .await?;

    run_tool(SAMTOOLS_TAG, &samtools::sort_args(&sam, &bam, config.threads), None, None).await?;
    fs::remove_file(&sam)?;
    run_tool(SAMTOOLS_TAG, &samtools::index_args(&bam), None, None).await?;

    let dedup = sample.dedup_bam(dirs);
    let picard_log = dirs.alignment.join(format!("{}_picard.log", sample.name));
    run_tool(
        PICARD_TAG,
        &picard::mark_duplicates_args(&bam, &dedup, &sample.dedup_metrics(dirs)),
        None,
        Some(&picard_log),
    )
    .await?;
    run_tool(SAMTOOLS_TAG, &samtools::index_args(&dedup), None, None).await?;

    let coverage_log = dirs.coverage.join(format!("{}_bamCoverage.log", sample.name));
    run_tool(
        BAMCOVERAGE_TAG,
        &bamcoverage::arg_generator(
            &dedup,
            &sample.coverage_bigwig(dirs),
            config.args.bin_size,
            genome_size,
            config.threads,
        ),
        None,
        Some(&coverage_log),
    )
    .await?;

    info!("{}: genome processing complete", sample.name);
    Ok(())
}

async fn call_peaks(
    config: Arc<RunConfig>,
    treat: &Sample,
    ctrl: &Sample,
    genome_size: u64,
) -> Result<(), PipelineError> {
    let dirs = &config.dirs;
    let log_path = dirs.peaks.join(format!("{}_macs2.log", config.args.prefix));
    run_tool(
        MACS2_TAG,
        &macs2::callpeak_args(
            &treat.dedup_bam(dirs),
            &ctrl.dedup_bam(dirs),
            genome_size,
            &config.args.prefix,
            &dirs.peaks,
        ),
        None,
        Some(&log_path),
    )
    .await
}

async fn annotate_peaks(
    config: Arc<RunConfig>,
    narrow_peak: &Path,
    annotation: &Path,
) -> Result<(), PipelineError> {
    let table = config
        .dirs
        .annotation
        .join(format!("{}_peak_annotation.tsv", config.args.prefix));
    run_tool(
        BEDTOOLS_TAG,
        &bedtools::intersect_args(narrow_peak, annotation),
        Some(&table),
        None,
    )
    .await
}

async fn metaplot(
    config: Arc<RunConfig>,
    treat: &Sample,
    ctrl: &Sample,
    tss_bed: &Path,
) -> Result<(), PipelineError> {
    let dirs = &config.dirs;
    let matrix = dirs.metaplot.join(format!("{}_tss_matrix.gz", config.args.prefix));
    let matrix_log = dirs.metaplot.join(format!("{}_computeMatrix.log", config.args.prefix));

    let treat_bw = treat.coverage_bigwig(dirs);
    let ctrl_bw = ctrl.coverage_bigwig(dirs);
    run_tool(
        COMPUTEMATRIX_TAG,
        &deeptools::compute_matrix_args(
            tss_bed,
            &[treat_bw.as_path(), ctrl_bw.as_path()],
            &matrix,
            config.args.flank,
            config.threads,
        ),
        None,
        Some(&matrix_log),
    )
    .await?;

    let heatmap = dirs.metaplot.join(format!("{}_tss_heatmap.png", config.args.prefix));
    run_tool(PLOTHEATMAP_TAG, &deeptools::plot_heatmap_args(&matrix, &heatmap), None, None).await?;

    let profile = dirs.metaplot.join(format!("{}_tss_profile.png", config.args.prefix));
    run_tool(PLOTPROFILE_TAG, &deeptools::plot_profile_args(&matrix, &profile), None, None).await?;
    Ok(())
}

async fn discover_motifs(
    config: Arc<RunConfig>,
    narrow_peak: &Path,
    genome_fasta: &Path,
) -> Result<(), PipelineError> {
    let log_path = config
        .dirs
        .motif
        .join(format!("{}_homer.log", config.args.prefix));
    run_tool(
        HOMER_MOTIF_TAG,
        &homer::motif_args(
            narrow_peak,
            genome_fasta,
            &config.dirs.motif,
            config.args.motif_size,
            config.threads,
        ),
        None,
        Some(&log_path),
    )
    .await
}
