/// File-backed stage checkpoints and cached spike-in counts.
///
/// A stage is complete iff its marker file exists; completion is binary.
/// Markers are written only after a stage's work unit returns success and
/// are never deleted by the pipeline itself.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::defs::{PipelineError, PipelineStage, SampleRole, StageStatus};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    prefix: String,
}

impl CheckpointStore {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        CheckpointStore {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    fn marker_path(&self, stage: PipelineStage) -> PathBuf {
        self.dir
            .join(format!("{}.stage{}.done", self.prefix, stage.number()))
    }

    fn count_path(&self, role: SampleRole) -> PathBuf {
        self.dir
            .join(format!("{}.spikein_count.{}.txt", self.prefix, role))
    }

    pub fn status(&self, stage: PipelineStage) -> StageStatus {
        if self.marker_path(stage).exists() {
            StageStatus::Done
        } else {
            StageStatus::Pending
        }
    }

    /// Creates the marker file. Called only after the stage's work unit
    /// completed without error; not atomic with the work unit itself, so a
    /// crash in between re-runs the stage on restart.
    pub fn mark_done(&self, stage: PipelineStage) -> Result<(), PipelineError> {
        let path = self.marker_path(stage);
        File::create(&path).map_err(|e| {
            PipelineError::Checkpoint(format!("Failed to write {}: {}", path.display(), e))
        })?;
        debug!("Checkpoint written: {}", path.display());
        Ok(())
    }

    pub fn cache_count(&self, role: SampleRole, count: u64) -> Result<(), PipelineError> {
        let path = self.count_path(role);
        let mut file = File::create(&path).map_err(|e| {
            PipelineError::Checkpoint(format!("Failed to write {}: {}", path.display(), e))
        })?;
        writeln!(file, "{}", count).map_err(|e| {
            PipelineError::Checkpoint(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    /// Reads a count cached by a previous run. Missing or malformed cache
    /// files are fatal: a resumed run cannot recompute them without
    /// re-running the stage that produced them.
    pub fn cached_count(&self, role: SampleRole) -> Result<u64, PipelineError> {
        let path = self.count_path(role);
        let raw = fs::read_to_string(&path).map_err(|e| {
            PipelineError::Checkpoint(format!(
                "Cannot read cached spike-in count {}: {}",
                path.display(),
                e
            ))
        })?;
        raw.trim().parse::<u64>().map_err(|e| {
            PipelineError::Checkpoint(format!(
                "Malformed cached spike-in count {}: {}",
                path.display(),
                e
            ))
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_status_transitions() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = CheckpointStore::new(tmp.path(), "run1");

        assert_eq!(store.status(PipelineStage::Qc), StageStatus::Pending);
        store.mark_done(PipelineStage::Qc)?;
        assert_eq!(store.status(PipelineStage::Qc), StageStatus::Done);
        // Other stages are unaffected
        assert_eq!(store.status(PipelineStage::SpikeinAlign), StageStatus::Pending);
        Ok(())
    }

    #[test]
    fn test_marker_name_carries_prefix_and_stage_number() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = CheckpointStore::new(tmp.path(), "exp42");
        store.mark_done(PipelineStage::PeakCall)?;
        assert!(tmp.path().join("exp42.stage4.done").exists());
        Ok(())
    }

    #[test]
    fn test_count_cache_roundtrip_across_reopen() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        {
            let store = CheckpointStore::new(tmp.path(), "run1");
            store.cache_count(SampleRole::Treatment, 1_000_000)?;
            store.cache_count(SampleRole::Control, 250_000)?;
        }
        // A fresh store over the same directory recovers the values
        let store = CheckpointStore::new(tmp.path(), "run1");
        assert_eq!(store.cached_count(SampleRole::Treatment)?, 1_000_000);
        assert_eq!(store.cached_count(SampleRole::Control)?, 250_000);
        Ok(())
    }

    #[test]
    fn test_missing_count_cache_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path(), "run1");
        let err = store.cached_count(SampleRole::Treatment).unwrap_err();
        match err {
            PipelineError::Checkpoint(msg) => assert!(msg.contains("spikein_count")),
            other => panic!("expected Checkpoint error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_count_cache_is_fatal() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let store = CheckpointStore::new(tmp.path(), "run1");
        std::fs::write(
            tmp.path().join("run1.spikein_count.control.txt"),
            "not-a-number\n",
        )?;
        assert!(store.cached_count(SampleRole::Control).is_err());
        Ok(())
    }
}
