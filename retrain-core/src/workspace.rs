//! Run workspace — output directory layout for one training run.

use crate::config::RunConfig;
use crate::error::{TrainError, TrainResult};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem layout for one training run.
///
/// `<save_root>/<run_id>/` holds the run log, the run report, and the
/// `trained_model/` directory with one checkpoint per completed epoch. The
/// orchestrator is the only writer of checkpoints; the retention sweep is
/// the only deleter.
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    run_dir: PathBuf,
    run_id: String,
}

impl RunWorkspace {
    /// Create `<save_root>/<run_id>/` and its `trained_model/` subdirectory.
    ///
    /// The run id embeds the model id, dataset id, retrieval depth, metric,
    /// and a second-resolution timestamp; the timestamp keeps repeated
    /// invocations with identical parameters from colliding. Creation
    /// failure is fatal and never retried.
    pub fn create(config: &RunConfig) -> TrainResult<Self> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let run_id = format!(
            "train_{}_{}_{}_{}_{}",
            config.model_id, config.dataset_id, config.retrieval_num, config.metric, timestamp
        );
        Self::create_with_id(&config.save_root, run_id)
    }

    /// Create the layout under an explicit run id.
    pub fn create_with_id(root: &Path, run_id: String) -> TrainResult<Self> {
        let run_dir = root.join(&run_id);
        fs::create_dir_all(&run_dir).map_err(|e| TrainError::filesystem(&run_dir, e))?;
        let model_dir = run_dir.join("trained_model");
        fs::create_dir_all(&model_dir).map_err(|e| TrainError::filesystem(&model_dir, e))?;
        Ok(Self { run_dir, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory holding one checkpoint per completed epoch.
    pub fn model_dir(&self) -> PathBuf {
        self.run_dir.join("trained_model")
    }

    /// Append-only run log.
    pub fn log_path(&self) -> PathBuf {
        self.run_dir.join("log.txt")
    }

    /// Checkpoint path for a 1-indexed epoch.
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.model_dir().join(format!("model_{epoch}"))
    }

    /// Persisted run summary.
    pub fn report_path(&self) -> PathBuf {
        self.run_dir.join("run.json")
    }
}
