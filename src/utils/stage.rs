/// Stage execution against the checkpoint store: skip-if-done, paired
/// two-sample fan-out, and failure aggregation.

use std::future::Future;

use log::info;
use tokio::task::JoinError;

use crate::config::defs::{PipelineError, PipelineStage, SampleRole, StageStatus};
use crate::utils::checkpoint::CheckpointStore;

/// Runs a single work unit unless its checkpoint already exists. Inputs
/// are not re-validated on skip.
pub async fn run_stage<F>(
    store: &CheckpointStore,
    stage: PipelineStage,
    work: F,
) -> Result<(), PipelineError>
where
    F: Future<Output = Result<(), PipelineError>>,
{
    if store.status(stage) == StageStatus::Done {
        info!("Stage {} ({}) already complete; skipping", stage.number(), stage);
        return Ok(());
    }
    info!("Stage {} ({}) starting", stage.number(), stage);
    work.await?;
    store.mark_done(stage)?;
    info!("Stage {} ({}) complete", stage.number(), stage);
    Ok(())
}

/// Runs the treatment and control work units of a stage concurrently and
/// joins both before judging the stage. There is no cancellation: a
/// failing sample does not interrupt its sibling, which runs to its own
/// completion or failure. The checkpoint is written only when both
/// succeed, so a rerun re-executes both samples.
///
/// # Returns
/// None when the stage was skipped via its checkpoint, otherwise the two
/// work unit outputs as (treatment, control).
pub async fn run_paired_stage<T, FT, FC>(
    store: &CheckpointStore,
    stage: PipelineStage,
    treat_work: FT,
    control_work: FC,
) -> Result<Option<(T, T)>, PipelineError>
where
    T: Send + 'static,
    FT: Future<Output = Result<T, PipelineError>> + Send + 'static,
    FC: Future<Output = Result<T, PipelineError>> + Send + 'static,
{
    if store.status(stage) == StageStatus::Done {
        info!("Stage {} ({}) already complete; skipping", stage.number(), stage);
        return Ok(None);
    }
    info!("Stage {} ({}) starting for both samples", stage.number(), stage);

    let treat_task = tokio::spawn(treat_work);
    let control_task = tokio::spawn(control_work);
    let (treat_res, control_res) = tokio::join!(treat_task, control_task);

    let mut failures: Vec<String> = Vec::new();
    let treat_out = settle(SampleRole::Treatment, treat_res, &mut failures);
    let control_out = settle(SampleRole::Control, control_res, &mut failures);

    match (treat_out, control_out) {
        (Some(t), Some(c)) if failures.is_empty() => {
            store.mark_done(stage)?;
            info!("Stage {} ({}) complete", stage.number(), stage);
            Ok(Some((t, c)))
        }
        _ => Err(PipelineError::StageFailed {
            stage: stage.to_string(),
            errors: failures.join("; "),
        }),
    }
}

fn settle<T>(
    role: SampleRole,
    result: Result<Result<T, PipelineError>, JoinError>,
    failures: &mut Vec<String>,
) -> Option<T> {
    match result {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            failures.push(format!("{}: {}", role, e));
            None
        }
        Err(e) => {
            failures.push(format!("{}: task panicked: {}", role, e));
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> CheckpointStore {
        CheckpointStore::new(tmp.path(), "test")
    }

    #[tokio::test]
    async fn test_run_stage_marks_done_on_success() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        run_stage(&store, PipelineStage::Qc, async { Ok(()) }).await?;
        assert_eq!(store.status(PipelineStage::Qc), StageStatus::Done);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_stage_skips_completed_work() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        store.mark_done(PipelineStage::Qc)?;

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        run_stage(&store, PipelineStage::Qc, async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await?;
        assert!(!ran.load(Ordering::SeqCst), "skipped stage must not execute");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_stage_withholds_marker_on_failure() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        let result = run_stage(&store, PipelineStage::Qc, async {
            Err(PipelineError::Other(anyhow!("boom")))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(store.status(PipelineStage::Qc), StageStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_paired_stage_returns_both_outputs() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        let result = run_paired_stage(
            &store,
            PipelineStage::SpikeinAlign,
            async { Ok(1_000_000u64) },
            async { Ok(250_000u64) },
        )
        .await?;
        assert_eq!(result, Some((1_000_000, 250_000)));
        assert_eq!(store.status(PipelineStage::SpikeinAlign), StageStatus::Done);
        Ok(())
    }

    #[tokio::test]
    async fn test_paired_stage_skip_returns_none() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        store.mark_done(PipelineStage::SpikeinAlign)?;
        let result: Option<(u64, u64)> = run_paired_stage(
            &store,
            PipelineStage::SpikeinAlign,
            async { panic!("must not run") },
            async { panic!("must not run") },
        )
        .await?;
        assert_eq!(result, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_paired_failure_keeps_sibling_running_and_no_marker() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        let sibling_finished = Arc::new(AtomicBool::new(false));
        let flag = sibling_finished.clone();

        let result: Result<Option<(u64, u64)>, _> = run_paired_stage(
            &store,
            PipelineStage::SpikeinAlign,
            async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(7)
            },
            async { Err(PipelineError::Other(anyhow!("control alignment failed"))) },
        )
        .await;

        assert!(result.is_err());
        assert!(
            sibling_finished.load(Ordering::SeqCst),
            "sibling task must run to completion, not be cancelled"
        );
        assert_eq!(store.status(PipelineStage::SpikeinAlign), StageStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_paired_failure_aggregates_both_roles() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        let result: Result<Option<(u64, u64)>, _> = run_paired_stage(
            &store,
            PipelineStage::GenomeProcess,
            async { Err(PipelineError::Other(anyhow!("treat failed"))) },
            async { Err(PipelineError::Other(anyhow!("control failed"))) },
        )
        .await;
        match result {
            Err(PipelineError::StageFailed { errors, .. }) => {
                assert!(errors.contains("treatment"));
                assert!(errors.contains("control"));
            }
            other => panic!("expected StageFailed, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_after_failure_executes_both_samples() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = store(&tmp);
        let treat_runs = Arc::new(AtomicU32::new(0));
        let control_runs = Arc::new(AtomicU32::new(0));

        let (t1, c1) = (treat_runs.clone(), control_runs.clone());
        let first: Result<Option<((), ())>, _> = run_paired_stage(
            &store,
            PipelineStage::SpikeinAlign,
            async move {
                t1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Other(anyhow!("transient")))
            },
        )
        .await;
        assert!(first.is_err());

        // Retry re-executes the treatment work too; the prior success is
        // not reused automatically.
        let (t2, c2) = (treat_runs.clone(), control_runs.clone());
        let second = run_paired_stage(
            &store,
            PipelineStage::SpikeinAlign,
            async move {
                t2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await?;
        assert!(second.is_some());
        assert_eq!(treat_runs.load(Ordering::SeqCst), 2);
        assert_eq!(control_runs.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
