use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use anyhow::anyhow;
use tempfile::TempDir;

use cuttag_pipelines::config::defs::{PipelineError, PipelineStage, SampleRole, StageStatus};
use cuttag_pipelines::utils::checkpoint::CheckpointStore;
use cuttag_pipelines::utils::index::ensure_tss_bed;
use cuttag_pipelines::utils::normalize::scale_factors;
use cuttag_pipelines::utils::stage::{run_paired_stage, run_stage};

#[tokio::test]
async fn test_resumed_run_skips_completed_stage_and_leaves_outputs_untouched() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = CheckpointStore::new(tmp.path(), "run1");
    let output = tmp.path().join("trimmed_R1.fastq");

    // First run executes the work unit and writes its output
    let out_path = output.clone();
    run_stage(&store, PipelineStage::Qc, async move {
        std::fs::write(&out_path, "@read1\nACGT\n+\nIIII\n")
            .map_err(|e| PipelineError::IOError(e.to_string()))?;
        Ok(())
    })
    .await?;
    let first_contents = std::fs::read(&output)?;
    let first_mtime = std::fs::metadata(&output)?.modified()?;

    // A resumed run must not re-execute the work unit or touch its output
    let out_path = output.clone();
    run_stage(&store, PipelineStage::Qc, async move {
        std::fs::write(&out_path, "corrupted")
            .map_err(|e| PipelineError::IOError(e.to_string()))?;
        Ok(())
    })
    .await?;

    assert_eq!(std::fs::read(&output)?, first_contents);
    assert_eq!(std::fs::metadata(&output)?.modified()?, first_mtime);
    Ok(())
}

#[tokio::test]
async fn test_failed_run_resumes_exactly_at_failed_stage() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = CheckpointStore::new(tmp.path(), "run1");
    let executions = Arc::new(AtomicU32::new(0));

    // Stages 1 and 2 succeed, stage 3 fails
    let counter = executions.clone();
    run_stage(&store, PipelineStage::Qc, async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await?;
    let counter = executions.clone();
    run_stage(&store, PipelineStage::SpikeinAlign, async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await?;
    let counter = executions.clone();
    let failed = run_stage(&store, PipelineStage::GenomeProcess, async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::Other(anyhow!("aligner died")))
    })
    .await;
    assert!(failed.is_err());
    assert_eq!(executions.load(Ordering::SeqCst), 3);

    // The restart skips the two completed stages and re-runs only stage 3
    for stage in [PipelineStage::Qc, PipelineStage::SpikeinAlign] {
        let counter = executions.clone();
        run_stage(&store, stage, async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await?;
    }
    let counter = executions.clone();
    run_stage(&store, PipelineStage::GenomeProcess, async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await?;

    assert_eq!(executions.load(Ordering::SeqCst), 4);
    assert_eq!(store.status(PipelineStage::GenomeProcess), StageStatus::Done);
    Ok(())
}

#[tokio::test]
async fn test_cached_counts_drive_factor_recomputation_on_resume() -> Result<()> {
    let tmp = TempDir::new()?;

    // First run: the paired spike-in stage produces and caches the counts
    {
        let store = CheckpointStore::new(tmp.path(), "run1");
        let (treat_store, ctrl_store) = (store.clone(), store.clone());
        let counts = run_paired_stage(
            &store,
            PipelineStage::SpikeinAlign,
            async move {
                treat_store.cache_count(SampleRole::Treatment, 1_000_000)?;
                Ok(1_000_000u64)
            },
            async move {
                ctrl_store.cache_count(SampleRole::Control, 250_000)?;
                Ok(250_000u64)
            },
        )
        .await?;
        assert_eq!(counts, Some((1_000_000, 250_000)));
    }

    // Resumed run: the stage is skipped, counts recover from the cache,
    // and the factors recompute deterministically
    let store = CheckpointStore::new(tmp.path(), "run1");
    let skipped: Option<(u64, u64)> = run_paired_stage(
        &store,
        PipelineStage::SpikeinAlign,
        async { panic!("must not re-run") },
        async { panic!("must not re-run") },
    )
    .await?;
    assert_eq!(skipped, None);

    let treat_count = store.cached_count(SampleRole::Treatment)?;
    let ctrl_count = store.cached_count(SampleRole::Control)?;
    let (factor_treat, factor_ctrl) = scale_factors(treat_count, ctrl_count)?;
    assert_eq!(factor_treat, 0.25);
    assert_eq!(factor_ctrl, 1.0);
    Ok(())
}

#[test]
fn test_tss_derivation_is_idempotent_across_runs() -> Result<()> {
    let tmp = TempDir::new()?;
    let annotation = tmp.path().join("anno.gff");
    std::fs::write(
        &annotation,
        "chr1\tsrc\tgene\t100\t200\t.\t+\t.\tID=geneA\n\
         chr1\tsrc\tgene\t300\t400\t.\t-\t.\tID=geneB\n",
    )?;
    let out = tmp.path().join("tss.bed");

    ensure_tss_bed(&annotation, &out, false)?;
    let first = std::fs::read_to_string(&out)?;
    assert_eq!(
        first,
        "chr1\t99\t100\tID=geneA\t.\t+\nchr1\t399\t400\tID=geneB\t.\t-\n"
    );

    // Second call reuses the existing file without re-deriving
    let mtime = std::fs::metadata(&out)?.modified()?;
    ensure_tss_bed(&annotation, &out, false)?;
    assert_eq!(std::fs::metadata(&out)?.modified()?, mtime);
    assert_eq!(std::fs::read_to_string(&out)?, first);
    Ok(())
}
