//! Epoch executor — one training pass followed by one validation pass.

use crate::collab::{BatchProducing, Forwardable, LossCriterion, Mode, Steppable, TensorLike};
use crate::config::DeviceId;
use crate::error::TrainResult;
use tracing::debug;

/// Scalars produced by one epoch, consumed immediately by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochResult {
    /// Smallest single-batch training loss seen this epoch — a pessimistic
    /// but cheap training signal, deliberately not an average.
    pub min_train_loss: f64,
    /// Sum of validation batch losses. A sum, not a mean: epochs are
    /// compared against each other over a fixed validation set, and the
    /// stopping rule depends on this exact accumulation.
    pub total_valid_loss: f64,
}

/// Run one full training pass and one full validation pass.
///
/// Training: per batch, move tensors to `device`, forward, loss against the
/// float-cast label, zero gradients, backward, one optimizer step.
/// Validation: identical loss computation with the unit in eval mode and no
/// backward or step. Malformed batches surface as errors from the producer
/// or the collaborators; nothing is recovered here.
pub fn run_epoch<T: TensorLike>(
    model: &mut dyn Forwardable<T>,
    criterion: &mut dyn LossCriterion<T>,
    optimizer: &mut dyn Steppable,
    train_data: &mut dyn BatchProducing<T>,
    valid_data: &mut dyn BatchProducing<T>,
    device: &DeviceId,
) -> TrainResult<EpochResult> {
    model.set_mode(Mode::Train);
    let mut min_train_loss = f64::INFINITY;
    let mut train_batches = 0usize;
    for batch in train_data.batches() {
        let batch = batch?.to_device(device)?;
        let prediction = model.forward(&batch)?;
        let target = batch.label.to_float();
        let loss = criterion.compute(&prediction, &target)?;
        optimizer.zero_gradients();
        criterion.backward()?;
        optimizer.step()?;
        if loss < min_train_loss {
            min_train_loss = loss;
        }
        train_batches += 1;
    }
    debug!(train_batches, "training pass done");

    model.set_mode(Mode::Eval);
    let mut total_valid_loss = 0.0;
    let mut valid_batches = 0usize;
    for batch in valid_data.batches() {
        let batch = batch?.to_device(device)?;
        let prediction = model.forward(&batch)?;
        let target = batch.label.to_float();
        total_valid_loss += criterion.compute(&prediction, &target)?;
        valid_batches += 1;
    }
    debug!(valid_batches, "validation pass done");

    Ok(EpochResult {
        min_train_loss,
        total_valid_loss,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::FeatureBatch;
    use crate::error::TrainError;
    use std::path::Path;

    /// Stub tensor: a bare scalar.
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Scalar(f64);

    impl TensorLike for Scalar {
        fn to_device(&self, _device: &DeviceId) -> TrainResult<Self> {
            Ok(*self)
        }

        fn to_float(&self) -> Self {
            *self
        }
    }

    fn batch_with_label(value: f64) -> FeatureBatch<Scalar> {
        FeatureBatch {
            content_vec: Scalar(0.0),
            text_vec: Scalar(0.0),
            retrieved_visual: Scalar(0.0),
            retrieved_textual: Scalar(0.0),
            retrieved_scores: Scalar(0.0),
            label: Scalar(value),
        }
    }

    /// Emits one fixed list of labelled batches per pass.
    struct FixedData {
        labels: Vec<f64>,
    }

    impl BatchProducing<Scalar> for FixedData {
        fn batches(&mut self) -> Box<dyn Iterator<Item = TrainResult<FeatureBatch<Scalar>>> + '_> {
            Box::new(self.labels.clone().into_iter().map(|v| Ok(batch_with_label(v))))
        }
    }

    /// Fails on the second batch of every pass.
    struct BrokenData;

    impl BatchProducing<Scalar> for BrokenData {
        fn batches(&mut self) -> Box<dyn Iterator<Item = TrainResult<FeatureBatch<Scalar>>> + '_> {
            Box::new(
                vec![
                    Ok(batch_with_label(1.0)),
                    Err(TrainError::data_shape("label block length mismatch")),
                ]
                .into_iter(),
            )
        }
    }

    /// Predicts zero; records mode switches and forward count.
    #[derive(Default)]
    struct ZeroModel {
        modes: Vec<Mode>,
        forwards: usize,
    }

    impl Forwardable<Scalar> for ZeroModel {
        fn to_device(&mut self, _device: &DeviceId) -> TrainResult<()> {
            Ok(())
        }

        fn set_mode(&mut self, mode: Mode) {
            self.modes.push(mode);
        }

        fn forward(&mut self, _batch: &FeatureBatch<Scalar>) -> TrainResult<Scalar> {
            self.forwards += 1;
            Ok(Scalar(0.0))
        }

        fn save(&self, _path: &Path) -> TrainResult<()> {
            Ok(())
        }
    }

    /// Loss = |prediction - target|; counts backward calls.
    #[derive(Default)]
    struct AbsCriterion {
        backwards: usize,
    }

    impl LossCriterion<Scalar> for AbsCriterion {
        fn compute(&mut self, prediction: &Scalar, target: &Scalar) -> TrainResult<f64> {
            Ok((prediction.0 - target.0).abs())
        }

        fn backward(&mut self) -> TrainResult<()> {
            self.backwards += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingOptim {
        zeroed: usize,
        stepped: usize,
    }

    impl Steppable for CountingOptim {
        fn zero_gradients(&mut self) {
            self.zeroed += 1;
        }

        fn step(&mut self) -> TrainResult<()> {
            self.stepped += 1;
            Ok(())
        }
    }

    #[test]
    fn test_min_over_train_and_sum_over_valid() {
        let mut model = ZeroModel::default();
        let mut criterion = AbsCriterion::default();
        let mut optim = CountingOptim::default();
        let mut train = FixedData {
            labels: vec![3.0, 1.0, 2.0],
        };
        let mut valid = FixedData {
            labels: vec![2.0, 2.5],
        };

        let result = run_epoch(
            &mut model,
            &mut criterion,
            &mut optim,
            &mut train,
            &mut valid,
            &DeviceId::new("cpu"),
        )
        .unwrap();

        assert_eq!(result.min_train_loss, 1.0);
        assert_eq!(result.total_valid_loss, 4.5);
    }

    #[test]
    fn test_backward_and_step_only_in_training_pass() {
        let mut model = ZeroModel::default();
        let mut criterion = AbsCriterion::default();
        let mut optim = CountingOptim::default();
        let mut train = FixedData {
            labels: vec![1.0, 2.0],
        };
        let mut valid = FixedData {
            labels: vec![1.0, 2.0, 3.0],
        };

        run_epoch(
            &mut model,
            &mut criterion,
            &mut optim,
            &mut train,
            &mut valid,
            &DeviceId::new("cpu"),
        )
        .unwrap();

        // Two train batches drive exactly two zero/backward/step rounds;
        // three validation batches drive none.
        assert_eq!(criterion.backwards, 2);
        assert_eq!(optim.zeroed, 2);
        assert_eq!(optim.stepped, 2);
        assert_eq!(model.forwards, 5);
        assert_eq!(model.modes, vec![Mode::Train, Mode::Eval]);
    }

    #[test]
    fn test_malformed_batch_propagates() {
        let mut model = ZeroModel::default();
        let mut criterion = AbsCriterion::default();
        let mut optim = CountingOptim::default();
        let mut train = BrokenData;
        let mut valid = FixedData { labels: vec![] };

        let err = run_epoch(
            &mut model,
            &mut criterion,
            &mut optim,
            &mut train,
            &mut valid,
            &DeviceId::new("cpu"),
        )
        .unwrap_err();

        assert!(matches!(err, TrainError::DataShape(_)));
    }
}
