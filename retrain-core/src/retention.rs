//! Checkpoint retention — the post-run sweep keeping only the best epoch.

use crate::error::{TrainError, TrainResult};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Delete every file in `model_dir` except `model_<best_epoch>`.
///
/// Runs exactly once, after the orchestrator reaches its terminal state,
/// never concurrently with checkpoint writes. With `best_epoch == 0` no
/// epoch ever finished; the sweep then refuses to delete anything rather
/// than wipe the directory.
pub fn prune_checkpoints(model_dir: &Path, best_epoch: usize) -> TrainResult<()> {
    if best_epoch == 0 {
        warn!(
            "no completed epoch to keep; leaving {} untouched",
            model_dir.display()
        );
        return Ok(());
    }

    let keep = format!("model_{best_epoch}");
    let entries = fs::read_dir(model_dir).map_err(|e| TrainError::filesystem(model_dir, e))?;
    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| TrainError::filesystem(model_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if entry.file_name().to_str() != Some(keep.as_str()) {
            fs::remove_file(&path).map_err(|e| TrainError::filesystem(&path, e))?;
            removed += 1;
        }
    }
    info!("retention kept {keep}, removed {removed} checkpoint(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_checkpoints(dir: &Path, epochs: &[usize]) {
        for epoch in epochs {
            fs::write(dir.join(format!("model_{epoch}")), b"params").unwrap();
        }
    }

    fn remaining(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_keeps_only_best_epoch() {
        let temp = TempDir::new().unwrap();
        write_checkpoints(temp.path(), &[1, 2, 3, 4, 5]);

        prune_checkpoints(temp.path(), 2).unwrap();

        assert_eq!(remaining(temp.path()), vec!["model_2".to_string()]);
    }

    #[test]
    fn test_best_epoch_zero_deletes_nothing() {
        let temp = TempDir::new().unwrap();
        write_checkpoints(temp.path(), &[1, 2]);

        prune_checkpoints(temp.path(), 0).unwrap();

        assert_eq!(
            remaining(temp.path()),
            vec!["model_1".to_string(), "model_2".to_string()]
        );
    }

    #[test]
    fn test_no_suffix_confusion() {
        // model_1 must not survive a sweep keeping model_11, and vice versa.
        let temp = TempDir::new().unwrap();
        write_checkpoints(temp.path(), &[1, 11]);

        prune_checkpoints(temp.path(), 1).unwrap();

        assert_eq!(remaining(temp.path()), vec!["model_1".to_string()]);
    }

    #[test]
    fn test_missing_dir_is_filesystem_error() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("trained_model");

        let err = prune_checkpoints(&gone, 1).unwrap_err();
        assert!(matches!(err, TrainError::Filesystem { .. }));
    }
}
