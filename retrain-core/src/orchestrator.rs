//! Training orchestrator — drives the epoch executor across epochs, tracks
//! the best checkpoint, applies the early-stopping rule, and triggers the
//! retention sweep.

use crate::collab::{BatchProducing, Forwardable, LossCriterion, Steppable, TensorLike};
use crate::config::RunConfig;
use crate::error::TrainResult;
use crate::executor::run_epoch;
use crate::metrics::{BestCheckpoint, RunMetrics, RunReport};
use crate::retention::prune_checkpoints;
use crate::workspace::RunWorkspace;
use chrono::Utc;
use tracing::info;

/// Best-so-far tracking for one run. Mutated only at epoch boundaries;
/// destroyed when the run returns.
#[derive(Debug, Clone)]
struct TrainingState {
    best_valid_loss: f64,
    best_epoch: usize,
    current_epoch: usize,
}

impl TrainingState {
    fn new() -> Self {
        Self {
            best_valid_loss: f64::INFINITY,
            best_epoch: 0,
            current_epoch: 0,
        }
    }

    /// Record epoch `epoch`; true when it strictly improved on the best
    /// validation loss. Ties do not improve.
    fn record(&mut self, epoch: usize, total_valid_loss: f64) -> bool {
        self.current_epoch = epoch;
        if total_valid_loss < self.best_valid_loss {
            self.best_valid_loss = total_valid_loss;
            self.best_epoch = epoch;
            true
        } else {
            false
        }
    }

    /// Early-stop rule: strictly more than `patience` epochs since the
    /// best, so a patience of P tolerates exactly P non-improving epochs.
    fn should_stop(&self, patience: usize) -> bool {
        self.current_epoch - self.best_epoch > patience
    }
}

/// One training run over a fixed set of collaborators.
///
/// The orchestrator is the only writer of checkpoints; the retention sweep
/// it triggers on termination is the only deleter. Everything runs on a
/// single logical thread.
pub struct TrainingRun<'a, T: TensorLike> {
    config: &'a RunConfig,
    workspace: &'a RunWorkspace,
    model: &'a mut dyn Forwardable<T>,
    criterion: &'a mut dyn LossCriterion<T>,
    optimizer: &'a mut dyn Steppable,
    train_data: &'a mut dyn BatchProducing<T>,
    valid_data: &'a mut dyn BatchProducing<T>,
}

impl<'a, T: TensorLike> TrainingRun<'a, T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &'a RunConfig,
        workspace: &'a RunWorkspace,
        model: &'a mut dyn Forwardable<T>,
        criterion: &'a mut dyn LossCriterion<T>,
        optimizer: &'a mut dyn Steppable,
        train_data: &'a mut dyn BatchProducing<T>,
        valid_data: &'a mut dyn BatchProducing<T>,
    ) -> Self {
        Self {
            config,
            workspace,
            model,
            criterion,
            optimizer,
            train_data,
            valid_data,
        }
    }

    /// Drive the run to its terminal state and return the persisted report.
    ///
    /// Per epoch: execute, log both scalars, persist `model_<epoch>`
    /// unconditionally, update best-tracking (strict `<`), then apply the
    /// early-stop rule. A checkpoint write failure aborts the run
    /// immediately; continuing would corrupt the retention guarantee.
    pub fn execute(mut self) -> TrainResult<RunReport> {
        self.log_banner();
        let started_at = Utc::now();

        self.model.to_device(&self.config.device)?;

        let mut state = TrainingState::new();
        let mut metrics = RunMetrics::default();

        for epoch in 1..=self.config.epochs {
            info!("--- epoch {epoch}/{} ---", self.config.epochs);
            let result = run_epoch(
                self.model,
                self.criterion,
                self.optimizer,
                self.train_data,
                self.valid_data,
                &self.config.device,
            )?;
            info!("[ epoch {epoch} (train) ] min batch loss = {}", result.min_train_loss);
            info!("[ epoch {epoch} (valid) ] total loss = {}", result.total_valid_loss);

            let checkpoint = self.workspace.checkpoint_path(epoch);
            self.model.save(&checkpoint)?;
            info!("checkpoint saved to {}", checkpoint.display());

            state.record(epoch, result.total_valid_loss);
            metrics.record_epoch(&result);
            info!(
                "current best: epoch {} (total valid loss = {})",
                state.best_epoch, state.best_valid_loss
            );

            if state.should_stop(self.config.patience) {
                info!(
                    "early stop: {} epochs without improvement exceeds patience {}",
                    epoch - state.best_epoch,
                    self.config.patience
                );
                break;
            }
        }

        prune_checkpoints(&self.workspace.model_dir(), state.best_epoch)?;

        let best_checkpoint = if state.best_epoch > 0 {
            Some(BestCheckpoint::from_file(
                state.best_epoch,
                &self.workspace.checkpoint_path(state.best_epoch),
            )?)
        } else {
            None
        };

        let finished_at = Utc::now();
        let report = RunReport {
            run_id: self.workspace.run_id().to_string(),
            config: self.config.clone(),
            metrics,
            best_epoch: state.best_epoch,
            best_valid_loss: (state.best_epoch > 0).then_some(state.best_valid_loss),
            best_checkpoint,
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
        };
        report.save(&self.workspace.report_path())?;

        info!("training run {} finished", self.workspace.run_id());
        Ok(report)
    }

    fn log_banner(&self) {
        let c = self.config;
        info!("random seed: {}", c.seed);
        info!("device: {}", c.device);
        info!("model: {}", c.model_id);
        info!("dataset: {}", c.dataset_id);
        info!("metric: {}", c.metric);
        info!("optimizer: {} (lr = {}, decay = {})", c.optim, c.lr, c.decay_rate);
        info!("epoch cap: {}", c.epochs);
        info!("retrieval depth: {}", c.retrieval_num);
        info!("early stop patience: {}", c.patience);
        info!("batch size: {}", c.batch_size);
        info!("training starts");
    }
}
