//! Run configuration consumed by the training orchestrator.
//!
//! The configuration arrives fully formed from an external parser (the CLI);
//! this module owns the selector enums, their string parsing, and the
//! numeric sanity checks performed once before a run starts.

use crate::error::{TrainError, TrainResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Opaque device identifier handed to collaborators (e.g. "cpu", "cuda:0").
///
/// The core never interprets it; it only forwards it to the batch and model
/// seams for placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Loss criterion selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    SquaredError,
    BinaryCrossEntropy,
}

impl FromStr for LossKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mse" | "squared_error" | "squared-error" => Ok(Self::SquaredError),
            "bce" | "binary_cross_entropy" | "binary-cross-entropy" => Ok(Self::BinaryCrossEntropy),
            other => Err(TrainError::config(format!(
                "unknown loss '{other}' (expected 'mse' or 'bce')"
            ))),
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SquaredError => f.write_str("mse"),
            Self::BinaryCrossEntropy => f.write_str("bce"),
        }
    }
}

/// Optimizer selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimKind {
    Adam,
    Sgd,
}

impl FromStr for OptimKind {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            other => Err(TrainError::config(format!(
                "unknown optimizer '{other}' (expected 'adam' or 'sgd')"
            ))),
        }
    }
}

impl fmt::Display for OptimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => f.write_str("adam"),
            Self::Sgd => f.write_str("sgd"),
        }
    }
}

/// Immutable configuration for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root seed for every pseudo-random source in the run.
    pub seed: u64,
    pub device: DeviceId,
    /// Metric label recorded in the run id and report; never alters control
    /// flow.
    pub metric: String,
    /// Folder receiving run directories.
    pub save_root: PathBuf,
    /// Epoch cap.
    pub epochs: usize,
    pub batch_size: usize,
    /// Consecutive non-improving epochs tolerated after the best epoch
    /// before the run stops.
    pub patience: usize,
    pub loss: LossKind,
    pub optim: OptimKind,
    pub lr: f64,
    /// Learning-rate decay; recorded in the report but not applied by the
    /// core.
    pub decay_rate: f64,
    pub dataset_id: String,
    pub dataset_path: PathBuf,
    /// Number of retrieved neighbours per item.
    pub retrieval_num: usize,
    pub model_id: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 2024,
            device: DeviceId::new("cpu"),
            metric: "mse".to_string(),
            save_root: PathBuf::from("./saved_models"),
            epochs: 1000,
            batch_size: 64,
            patience: 10,
            loss: LossKind::SquaredError,
            optim: OptimKind::Adam,
            lr: 1e-4,
            decay_rate: 1.0,
            dataset_id: "synthetic".to_string(),
            dataset_path: PathBuf::from("./datasets"),
            retrieval_num: 500,
            model_id: "linear".to_string(),
        }
    }
}

impl RunConfig {
    /// Numeric sanity checks, performed once before the run starts.
    ///
    /// Loss and optimizer membership is already enforced by the enum types;
    /// string parsing failures surface from [`LossKind::from_str`] and
    /// [`OptimKind::from_str`] before a config can be built.
    pub fn validate(&self) -> TrainResult<()> {
        if self.epochs == 0 {
            return Err(TrainError::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(TrainError::config(format!(
                "lr must be finite and positive, got {}",
                self.lr
            )));
        }
        if !self.decay_rate.is_finite() {
            return Err(TrainError::config("decay_rate must be finite"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_kind_parsing() {
        assert_eq!("mse".parse::<LossKind>().unwrap(), LossKind::SquaredError);
        assert_eq!(
            "BCE".parse::<LossKind>().unwrap(),
            LossKind::BinaryCrossEntropy
        );
        assert!(matches!(
            "hinge".parse::<LossKind>(),
            Err(TrainError::Config(_))
        ));
    }

    #[test]
    fn test_optim_kind_parsing() {
        assert_eq!("Adam".parse::<OptimKind>().unwrap(), OptimKind::Adam);
        assert_eq!("sgd".parse::<OptimKind>().unwrap(), OptimKind::Sgd);
        assert!(matches!(
            "rmsprop".parse::<OptimKind>(),
            Err(TrainError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_numerics() {
        let mut config = RunConfig::default();
        config.epochs = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.lr = -0.5;
        assert!(config.validate().is_err());

        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = RunConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seed, config.seed);
        assert_eq!(parsed.loss, config.loss);
        assert_eq!(parsed.optim, config.optim);
        assert_eq!(parsed.device, config.device);
    }
}
