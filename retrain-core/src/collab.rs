//! Collaborator seams — the opaque trainable unit, its batch producer,
//! loss criterion, and optimizer.
//!
//! The core never touches tensor numerics. Everything it drives is behind
//! these traits, so the orchestrator and executor can be exercised against
//! stub implementations without a tensor runtime.

use crate::config::DeviceId;
use crate::error::TrainResult;
use std::path::Path;

/// Train vs. evaluation behaviour of the trainable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Parameter updates enabled.
    Train,
    /// Parameter updates disabled; no gradient tracking.
    Eval,
}

/// Capability of the opaque tensor handle carried in batches.
pub trait TensorLike: Clone {
    /// Copy of this tensor resident on `device`.
    fn to_device(&self, device: &DeviceId) -> TrainResult<Self>;

    /// Floating-point view of label data.
    fn to_float(&self) -> Self;
}

/// One retrieval-augmented batch: five feature blocks plus the label.
#[derive(Debug, Clone)]
pub struct FeatureBatch<T> {
    /// Pooled content embedding of the item.
    pub content_vec: T,
    /// Fused text embedding of the item.
    pub text_vec: T,
    /// Visual embeddings of the retrieved neighbours.
    pub retrieved_visual: T,
    /// Textual embeddings of the retrieved neighbours.
    pub retrieved_textual: T,
    /// Target values of the retrieved neighbours.
    pub retrieved_scores: T,
    /// Supervision target for the batch.
    pub label: T,
}

impl<T: TensorLike> FeatureBatch<T> {
    /// Move every tensor-valued element onto `device`.
    pub fn to_device(&self, device: &DeviceId) -> TrainResult<Self> {
        Ok(Self {
            content_vec: self.content_vec.to_device(device)?,
            text_vec: self.text_vec.to_device(device)?,
            retrieved_visual: self.retrieved_visual.to_device(device)?,
            retrieved_textual: self.retrieved_textual.to_device(device)?,
            retrieved_scores: self.retrieved_scores.to_device(device)?,
            label: self.label.to_device(device)?,
        })
    }
}

/// Sequence producer yielding fixed-shape batches.
///
/// Each `batches` call is one full pass over the dataset, in producer
/// order. Batch-level parallelism (prefetch and the like) is the
/// producer's business and invisible to the core.
pub trait BatchProducing<T> {
    fn batches(&mut self) -> Box<dyn Iterator<Item = TrainResult<FeatureBatch<T>>> + '_>;
}

/// The opaque trainable unit.
pub trait Forwardable<T> {
    /// Move parameters onto `device`.
    fn to_device(&mut self, device: &DeviceId) -> TrainResult<()>;

    /// Switch between parameter-updating and evaluation behaviour.
    fn set_mode(&mut self, mode: Mode);

    /// Score a feature batch.
    fn forward(&mut self, batch: &FeatureBatch<T>) -> TrainResult<T>;

    /// Snapshot parameters to `path`. This is the checkpoint write; a
    /// failure here is fatal to the run.
    fn save(&self, path: &Path) -> TrainResult<()>;
}

/// Loss criterion over predictions and float-cast targets.
///
/// `backward` propagates gradients from the most recent `compute`; the
/// executor only ever calls it during the training pass, so an
/// implementation may skip gradient bookkeeping while the unit is in
/// [`Mode::Eval`].
pub trait LossCriterion<T> {
    /// Scalar loss of `prediction` against `target`.
    fn compute(&mut self, prediction: &T, target: &T) -> TrainResult<f64>;

    /// Back-propagate gradients for the last computed loss.
    fn backward(&mut self) -> TrainResult<()>;
}

/// Optimizer over the trainable unit's parameters.
pub trait Steppable {
    /// Clear accumulated gradients.
    fn zero_gradients(&mut self);

    /// Apply one parameter update.
    fn step(&mut self) -> TrainResult<()>;
}
