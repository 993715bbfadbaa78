//! # retrain-core — training-run orchestration for retrieval-augmented models
//!
//! This crate drives an opaque trainable unit through train/validate epochs,
//! persists a checkpoint per epoch, applies an early-stopping rule, and
//! keeps only the best checkpoint once the run ends. Model, dataset, loss,
//! and optimizer are collaborator seams (see [`collab`]), so the whole loop
//! can be exercised against stub implementations without a tensor runtime.
//!
//! A run is a single logical thread of control: the orchestrator drives the
//! executor synchronously, and the only termination paths are the epoch
//! cap, the early-stop rule, and fatal errors.

pub mod collab;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
pub mod retention;
pub mod seed;
pub mod workspace;

pub use collab::{BatchProducing, FeatureBatch, Forwardable, LossCriterion, Mode, Steppable, TensorLike};
pub use config::{DeviceId, LossKind, OptimKind, RunConfig};
pub use error::{TrainError, TrainResult};
pub use executor::EpochResult;
pub use logging::{LogGuard, init_run_logging};
pub use metrics::{BestCheckpoint, RunMetrics, RunReport};
pub use orchestrator::TrainingRun;
pub use retention::prune_checkpoints;
pub use seed::SeedManager;
pub use workspace::RunWorkspace;
