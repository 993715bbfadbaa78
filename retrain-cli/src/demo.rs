//! Built-in demo pipeline — a synthetic retrieval-augmented dataset and a
//! linear scorer with analytic gradients.
//!
//! This is what makes the binary runnable end to end without an external
//! tensor runtime: the scorer, criteria, and optimizers implement the core
//! collaborator seams over plain `Vec<f32>` blocks. The orchestrator never
//! sees any of this; it only drives the traits.

use rand::Rng;
use rand::rngs::StdRng;
use retrain_core::persistence;
use retrain_core::{
    BatchProducing, DeviceId, FeatureBatch, Forwardable, LossCriterion, LossKind, Mode, OptimKind,
    Steppable, TensorLike, TrainError, TrainResult,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

const BCE_EPS: f32 = 1e-7;

/// Dense row-major block: `rows` samples of `cols` values each.
#[derive(Debug, Clone)]
pub struct DenseBlock {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl DenseBlock {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        Self { rows, cols, data }
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    fn check(&self, what: &str, rows: usize) -> TrainResult<()> {
        if self.rows != rows {
            return Err(TrainError::data_shape(format!(
                "{what}: expected {rows} rows, got {}",
                self.rows
            )));
        }
        if self.data.len() != self.rows * self.cols {
            return Err(TrainError::data_shape(format!(
                "{what}: {} values do not fill {}x{}",
                self.data.len(),
                self.rows,
                self.cols
            )));
        }
        Ok(())
    }
}

impl TensorLike for DenseBlock {
    // The demo is single-process: placement is the identity.
    fn to_device(&self, _device: &DeviceId) -> TrainResult<Self> {
        Ok(self.clone())
    }

    fn to_float(&self) -> Self {
        self.clone()
    }
}

/// Per-block feature widths of the synthetic dataset.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDims {
    pub content: usize,
    pub text: usize,
    pub visual: usize,
    pub textual: usize,
    pub scores: usize,
}

impl FeatureDims {
    /// Widths for a configured retrieval depth. The retrieved blocks grow
    /// with the depth, capped so the demo stays cheap at depth 500.
    pub fn for_depth(retrieval_num: usize) -> Self {
        let k = retrieval_num.clamp(1, 16);
        Self {
            content: 8,
            text: 8,
            visual: k,
            textual: k,
            scores: k,
        }
    }

    pub fn total(&self) -> usize {
        self.content + self.text + self.visual + self.textual + self.scores
    }
}

/// Shared parameter state: the model writes forward activations, the
/// criterion writes gradients, the optimizer applies them.
#[derive(Debug)]
pub struct LinearParams {
    pub weights: Vec<f32>,
    pub bias: f32,
    grad_weights: Vec<f32>,
    grad_bias: f32,
    last_inputs: Vec<Vec<f32>>,
}

pub type SharedParams = Rc<RefCell<LinearParams>>;

#[derive(Debug, Serialize, Deserialize)]
struct SavedParams {
    weights: Vec<f32>,
    bias: f32,
}

/// Linear scorer over the concatenated feature blocks.
pub struct LinearModel {
    dims: FeatureDims,
    params: SharedParams,
    mode: Mode,
}

impl LinearModel {
    pub fn new(dims: FeatureDims, rng: &mut StdRng) -> (Self, SharedParams) {
        let total = dims.total();
        let weights: Vec<f32> = (0..total).map(|_| rng.gen_range(-0.05..0.05)).collect();
        let params = Rc::new(RefCell::new(LinearParams {
            grad_weights: vec![0.0; total],
            grad_bias: 0.0,
            weights,
            bias: 0.0,
            last_inputs: Vec::new(),
        }));
        let model = Self {
            dims,
            params: Rc::clone(&params),
            mode: Mode::Train,
        };
        (model, params)
    }

    fn concat_sample(&self, batch: &FeatureBatch<DenseBlock>, i: usize) -> Vec<f32> {
        let mut x = Vec::with_capacity(self.dims.total());
        x.extend_from_slice(batch.content_vec.row(i));
        x.extend_from_slice(batch.text_vec.row(i));
        x.extend_from_slice(batch.retrieved_visual.row(i));
        x.extend_from_slice(batch.retrieved_textual.row(i));
        x.extend_from_slice(batch.retrieved_scores.row(i));
        x
    }

    fn check_batch(&self, batch: &FeatureBatch<DenseBlock>) -> TrainResult<usize> {
        let rows = batch.label.rows;
        batch.label.check("label", rows)?;
        batch.content_vec.check("content_vec", rows)?;
        batch.text_vec.check("text_vec", rows)?;
        batch.retrieved_visual.check("retrieved_visual", rows)?;
        batch.retrieved_textual.check("retrieved_textual", rows)?;
        batch.retrieved_scores.check("retrieved_scores", rows)?;
        let width = batch.content_vec.cols
            + batch.text_vec.cols
            + batch.retrieved_visual.cols
            + batch.retrieved_textual.cols
            + batch.retrieved_scores.cols;
        if width != self.dims.total() {
            return Err(TrainError::data_shape(format!(
                "feature width {width} does not match model width {}",
                self.dims.total()
            )));
        }
        Ok(rows)
    }
}

impl Forwardable<DenseBlock> for LinearModel {
    fn to_device(&mut self, _device: &DeviceId) -> TrainResult<()> {
        Ok(())
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(&mut self, batch: &FeatureBatch<DenseBlock>) -> TrainResult<DenseBlock> {
        let rows = self.check_batch(batch)?;
        let mut params = self.params.borrow_mut();
        let mut scores = Vec::with_capacity(rows);
        let mut inputs = Vec::with_capacity(rows);
        for i in 0..rows {
            let x = self.concat_sample(batch, i);
            let score: f32 = params
                .weights
                .iter()
                .zip(x.iter())
                .map(|(w, v)| w * v)
                .sum::<f32>()
                + params.bias;
            scores.push(score);
            if self.mode == Mode::Train {
                inputs.push(x);
            }
        }
        // Gradient bookkeeping only while training; eval stays trackless.
        if self.mode == Mode::Train {
            params.last_inputs = inputs;
        }
        Ok(DenseBlock::new(rows, 1, scores))
    }

    fn save(&self, path: &Path) -> TrainResult<()> {
        let params = self.params.borrow();
        persistence::atomic_write_json(
            path,
            &SavedParams {
                weights: params.weights.clone(),
                bias: params.bias,
            },
        )
    }
}

/// Mean squared error over raw scores.
pub struct MseCriterion {
    params: SharedParams,
    residuals: Vec<f32>,
}

/// Binary cross-entropy over sigmoid-squashed scores.
pub struct BceCriterion {
    params: SharedParams,
    residuals: Vec<f32>,
}

pub fn build_criterion(
    kind: LossKind,
    params: &SharedParams,
) -> Box<dyn LossCriterion<DenseBlock>> {
    match kind {
        LossKind::SquaredError => Box::new(MseCriterion {
            params: Rc::clone(params),
            residuals: Vec::new(),
        }),
        LossKind::BinaryCrossEntropy => Box::new(BceCriterion {
            params: Rc::clone(params),
            residuals: Vec::new(),
        }),
    }
}

fn check_pair(prediction: &DenseBlock, target: &DenseBlock) -> TrainResult<usize> {
    if prediction.rows != target.rows || prediction.data.len() != target.data.len() {
        return Err(TrainError::data_shape(format!(
            "prediction {}x{} vs target {}x{}",
            prediction.rows, prediction.cols, target.rows, target.cols
        )));
    }
    Ok(prediction.rows)
}

/// Accumulate d(loss)/d(score) into the shared gradient buffers through the
/// inputs recorded by the last training forward.
fn accumulate(params: &SharedParams, residuals: &[f32]) -> TrainResult<()> {
    let mut params = params.borrow_mut();
    let LinearParams {
        grad_weights,
        grad_bias,
        last_inputs,
        ..
    } = &mut *params;
    if last_inputs.len() != residuals.len() {
        return Err(TrainError::collaborator(format!(
            "backward saw {} residuals for {} recorded samples",
            residuals.len(),
            last_inputs.len()
        )));
    }
    for (g, x) in residuals.iter().zip(last_inputs.iter()) {
        for (gw, v) in grad_weights.iter_mut().zip(x.iter()) {
            *gw += g * v;
        }
        *grad_bias += g;
    }
    Ok(())
}

impl LossCriterion<DenseBlock> for MseCriterion {
    fn compute(&mut self, prediction: &DenseBlock, target: &DenseBlock) -> TrainResult<f64> {
        let n = check_pair(prediction, target)?;
        let inv_n = 1.0 / n as f32;
        let mut loss = 0.0f64;
        self.residuals.clear();
        for (p, y) in prediction.data.iter().zip(target.data.iter()) {
            let diff = p - y;
            loss += f64::from(diff * diff);
            self.residuals.push(2.0 * diff * inv_n);
        }
        Ok(loss / n as f64)
    }

    fn backward(&mut self) -> TrainResult<()> {
        accumulate(&self.params, &self.residuals)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl LossCriterion<DenseBlock> for BceCriterion {
    fn compute(&mut self, prediction: &DenseBlock, target: &DenseBlock) -> TrainResult<f64> {
        let n = check_pair(prediction, target)?;
        let inv_n = 1.0 / n as f32;
        let mut loss = 0.0f64;
        self.residuals.clear();
        for (s, y) in prediction.data.iter().zip(target.data.iter()) {
            let p = sigmoid(*s);
            loss -= f64::from(y * (p + BCE_EPS).ln() + (1.0 - y) * (1.0 - p + BCE_EPS).ln());
            // d(loss)/d(score) collapses to (p - y) for sigmoid + BCE.
            self.residuals.push((p - y) * inv_n);
        }
        Ok(loss / n as f64)
    }

    fn backward(&mut self) -> TrainResult<()> {
        accumulate(&self.params, &self.residuals)
    }
}

/// Plain gradient descent.
pub struct SgdOptimizer {
    params: SharedParams,
    lr: f32,
}

/// Adam with bias-corrected first and second moments.
pub struct AdamOptimizer {
    params: SharedParams,
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    m_weights: Vec<f32>,
    v_weights: Vec<f32>,
    m_bias: f32,
    v_bias: f32,
}

pub fn build_optimizer(kind: OptimKind, lr: f64, params: &SharedParams) -> Box<dyn Steppable> {
    match kind {
        OptimKind::Sgd => Box::new(SgdOptimizer {
            params: Rc::clone(params),
            lr: lr as f32,
        }),
        OptimKind::Adam => {
            let total = params.borrow().weights.len();
            Box::new(AdamOptimizer {
                params: Rc::clone(params),
                lr: lr as f32,
                beta1: 0.9,
                beta2: 0.999,
                eps: 1e-8,
                t: 0,
                m_weights: vec![0.0; total],
                v_weights: vec![0.0; total],
                m_bias: 0.0,
                v_bias: 0.0,
            })
        }
    }
}

impl Steppable for SgdOptimizer {
    fn zero_gradients(&mut self) {
        let mut params = self.params.borrow_mut();
        params.grad_weights.iter_mut().for_each(|g| *g = 0.0);
        params.grad_bias = 0.0;
    }

    fn step(&mut self) -> TrainResult<()> {
        let mut params = self.params.borrow_mut();
        let LinearParams {
            weights,
            bias,
            grad_weights,
            grad_bias,
            ..
        } = &mut *params;
        for (w, g) in weights.iter_mut().zip(grad_weights.iter()) {
            *w -= self.lr * g;
        }
        *bias -= self.lr * *grad_bias;
        Ok(())
    }
}

impl Steppable for AdamOptimizer {
    fn zero_gradients(&mut self) {
        let mut params = self.params.borrow_mut();
        params.grad_weights.iter_mut().for_each(|g| *g = 0.0);
        params.grad_bias = 0.0;
    }

    fn step(&mut self) -> TrainResult<()> {
        let mut params = self.params.borrow_mut();
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);
        let LinearParams {
            weights,
            bias,
            grad_weights,
            grad_bias,
            ..
        } = &mut *params;
        for (((w, g), m), v) in weights
            .iter_mut()
            .zip(grad_weights.iter())
            .zip(self.m_weights.iter_mut())
            .zip(self.v_weights.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *w -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
        self.m_bias = self.beta1 * self.m_bias + (1.0 - self.beta1) * *grad_bias;
        self.v_bias = self.beta2 * self.v_bias + (1.0 - self.beta2) * *grad_bias * *grad_bias;
        let m_hat = self.m_bias / bc1;
        let v_hat = self.v_bias / bc2;
        *bias -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        Ok(())
    }
}

/// Pre-generated synthetic dataset; every pass replays the same batches in
/// the same order.
pub struct SyntheticData {
    batches: Vec<FeatureBatch<DenseBlock>>,
}

impl BatchProducing<DenseBlock> for SyntheticData {
    fn batches(&mut self) -> Box<dyn Iterator<Item = TrainResult<FeatureBatch<DenseBlock>>> + '_> {
        Box::new(self.batches.iter().cloned().map(Ok))
    }
}

/// Generate `n_samples` items whose labels follow a hidden linear rule over
/// the concatenated feature blocks, squashed into (0, 1) so both criteria
/// apply.
pub fn generate(
    n_samples: usize,
    batch_size: usize,
    dims: &FeatureDims,
    rng: &mut StdRng,
) -> SyntheticData {
    let total = dims.total();
    let hidden: Vec<f32> = (0..total).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let scale = 1.0 / (total as f32).sqrt();

    let mut samples: Vec<(Vec<f32>, f32)> = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let x: Vec<f32> = (0..total).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let margin: f32 = hidden.iter().zip(x.iter()).map(|(h, v)| h * v).sum::<f32>() * scale;
        let noise: f32 = rng.gen_range(-0.05..0.05);
        samples.push((x, sigmoid(margin + noise)));
    }

    let mut batches = Vec::new();
    for chunk in samples.chunks(batch_size) {
        let rows = chunk.len();
        let mut content = Vec::with_capacity(rows * dims.content);
        let mut text = Vec::with_capacity(rows * dims.text);
        let mut visual = Vec::with_capacity(rows * dims.visual);
        let mut textual = Vec::with_capacity(rows * dims.textual);
        let mut scores = Vec::with_capacity(rows * dims.scores);
        let mut labels = Vec::with_capacity(rows);
        for (x, y) in chunk {
            let mut offset = 0;
            for (block, width) in [
                (&mut content, dims.content),
                (&mut text, dims.text),
                (&mut visual, dims.visual),
                (&mut textual, dims.textual),
                (&mut scores, dims.scores),
            ] {
                block.extend_from_slice(&x[offset..offset + width]);
                offset += width;
            }
            labels.push(*y);
        }
        batches.push(FeatureBatch {
            content_vec: DenseBlock::new(rows, dims.content, content),
            text_vec: DenseBlock::new(rows, dims.text, text),
            retrieved_visual: DenseBlock::new(rows, dims.visual, visual),
            retrieved_textual: DenseBlock::new(rows, dims.textual, textual),
            retrieved_scores: DenseBlock::new(rows, dims.scores, scores),
            label: DenseBlock::new(rows, 1, labels),
        });
    }

    SyntheticData { batches }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use retrain_core::{RunConfig, RunWorkspace, SeedManager, TrainingRun};
    use tempfile::TempDir;

    fn small_dims() -> FeatureDims {
        FeatureDims {
            content: 4,
            text: 4,
            visual: 4,
            textual: 4,
            scores: 4,
        }
    }

    fn demo_run(loss: LossKind, optim: OptimKind, lr: f64, epochs: usize) -> retrain_core::RunReport {
        let temp = TempDir::new().unwrap();
        let config = RunConfig {
            save_root: temp.path().to_path_buf(),
            epochs,
            patience: epochs,
            loss,
            optim,
            lr,
            batch_size: 32,
            ..RunConfig::default()
        };
        let workspace =
            RunWorkspace::create_with_id(temp.path(), format!("demo-{loss}-{optim}")).unwrap();

        let mut seeds = SeedManager::new(config.seed);
        let dims = small_dims();
        let mut data_rng = seeds.component_rng("dataset");
        let mut train = generate(256, config.batch_size, &dims, &mut data_rng);
        let mut valid = generate(64, config.batch_size, &dims, &mut data_rng);
        let (mut model, params) = LinearModel::new(dims, &mut seeds.component_rng("model"));
        let mut criterion = build_criterion(config.loss, &params);
        let mut optimizer = build_optimizer(config.optim, config.lr, &params);

        let report = TrainingRun::new(
            &config,
            &workspace,
            &mut model,
            criterion.as_mut(),
            optimizer.as_mut(),
            &mut train,
            &mut valid,
        )
        .execute()
        .unwrap();

        // Exactly one checkpoint survives retention, named after the best.
        let names: Vec<String> = std::fs::read_dir(workspace.model_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("model_{}", report.best_epoch)]);

        report
    }

    #[test]
    fn test_sgd_mse_learns() {
        let report = demo_run(LossKind::SquaredError, OptimKind::Sgd, 0.01, 10);
        let history = &report.metrics.total_valid_loss_history;
        assert_eq!(history.len(), 10);
        assert!(report.best_valid_loss.unwrap() < history[0]);
    }

    #[test]
    fn test_adam_bce_completes() {
        let report = demo_run(LossKind::BinaryCrossEntropy, OptimKind::Adam, 0.001, 5);
        let history = &report.metrics.total_valid_loss_history;
        assert_eq!(report.metrics.epochs_completed, history.len());
        assert!(history.iter().all(|l| l.is_finite()));
        assert!(report.best_valid_loss.unwrap() <= history[0]);
    }

    #[test]
    fn test_shape_mismatch_surfaces_as_data_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let dims = small_dims();
        let (mut model, _params) = LinearModel::new(dims, &mut rng);

        // Label claims two rows; every feature block carries one.
        let bad = FeatureBatch {
            content_vec: DenseBlock::new(1, 4, vec![0.0; 4]),
            text_vec: DenseBlock::new(1, 4, vec![0.0; 4]),
            retrieved_visual: DenseBlock::new(1, 4, vec![0.0; 4]),
            retrieved_textual: DenseBlock::new(1, 4, vec![0.0; 4]),
            retrieved_scores: DenseBlock::new(1, 4, vec![0.0; 4]),
            label: DenseBlock::new(2, 1, vec![0.5, 0.5]),
        };

        let err = model.forward(&bad).unwrap_err();
        assert!(matches!(err, TrainError::DataShape(_)));
    }

    #[test]
    fn test_save_writes_parameter_snapshot() {
        let temp = TempDir::new().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let (model, _params) = LinearModel::new(small_dims(), &mut rng);

        let path = temp.path().join("model_1");
        model.save(&path).unwrap();

        let saved: SavedParams =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.weights.len(), small_dims().total());
    }

    #[test]
    fn test_generate_is_deterministic_per_seed() {
        let dims = small_dims();
        let mut a = generate(16, 4, &dims, &mut StdRng::seed_from_u64(9));
        let mut b = generate(16, 4, &dims, &mut StdRng::seed_from_u64(9));

        let labels = |data: &mut SyntheticData| -> Vec<f32> {
            data.batches()
                .map(|batch| batch.unwrap().label.data)
                .flatten()
                .collect()
        };
        assert_eq!(labels(&mut a), labels(&mut b));
    }
}
