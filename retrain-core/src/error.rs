//! Error types for the retrain-core crate.

use std::path::PathBuf;
use thiserror::Error;

pub type TrainResult<T> = std::result::Result<T, TrainError>;

/// Top-level error type for training runs.
///
/// Every failure in the core either aborts the run or is surfaced to the
/// caller; there is no retry logic anywhere in this crate.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Invalid run configuration (unknown loss/optimizer name, nonsensical
    /// numeric value). Callers are expected to treat this as fatal before
    /// the run starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workspace, checkpoint, or retention I/O failure. Fatal; transient
    /// and permanent causes are deliberately not distinguished.
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed batch from the dataset producer. Propagated uncaught;
    /// the core performs no batch validation of its own.
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// Failure reported by an opaque collaborator (forward, loss, step).
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data_shape(msg: impl Into<String>) -> Self {
        Self::DataShape(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
