//! Run metrics — epoch histories and the persisted run report.

use crate::config::RunConfig;
use crate::error::{TrainError, TrainResult};
use crate::executor::EpochResult;
use crate::persistence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Epoch-indexed loss histories for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub epochs_completed: usize,
    pub min_train_loss_history: Vec<f64>,
    pub total_valid_loss_history: Vec<f64>,
}

impl RunMetrics {
    pub fn record_epoch(&mut self, result: &EpochResult) {
        self.min_train_loss_history.push(result.min_train_loss);
        self.total_valid_loss_history.push(result.total_valid_loss);
        self.epochs_completed += 1;
    }
}

/// Identity of the checkpoint that survived retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub epoch: usize,
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

impl BestCheckpoint {
    /// Hash and measure the checkpoint file at `path`.
    pub fn from_file(epoch: usize, path: &Path) -> TrainResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| TrainError::filesystem(path, e))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Self {
            epoch,
            path: path.to_path_buf(),
            sha256: format!("{:x}", hasher.finalize()),
            size_bytes: bytes.len() as u64,
        })
    }
}

/// Persisted summary of a completed run (`run.json` in the run directory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub config: RunConfig,
    pub metrics: RunMetrics,
    /// 1-indexed best epoch; 0 when no epoch ever completed.
    pub best_epoch: usize,
    /// `None` when no epoch ever improved on the sentinel.
    pub best_valid_loss: Option<f64>,
    pub best_checkpoint: Option<BestCheckpoint>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn save(&self, path: &Path) -> TrainResult<()> {
        persistence::atomic_write_json(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_epoch_appends_histories() {
        let mut metrics = RunMetrics::default();
        metrics.record_epoch(&EpochResult {
            min_train_loss: 0.4,
            total_valid_loss: 5.0,
        });
        metrics.record_epoch(&EpochResult {
            min_train_loss: 0.3,
            total_valid_loss: 4.0,
        });

        assert_eq!(metrics.epochs_completed, 2);
        assert_eq!(metrics.min_train_loss_history, vec![0.4, 0.3]);
        assert_eq!(metrics.total_valid_loss_history, vec![5.0, 4.0]);
    }

    #[test]
    fn test_best_checkpoint_hashes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model_2");
        std::fs::write(&path, b"params").unwrap();

        let best = BestCheckpoint::from_file(2, &path).unwrap();
        assert_eq!(best.epoch, 2);
        assert_eq!(best.size_bytes, 6);
        // Stable digest of b"params".
        assert_eq!(best.sha256.len(), 64);
    }
}
