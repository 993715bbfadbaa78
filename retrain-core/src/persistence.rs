//! Atomic JSON persistence for run artifacts.

use crate::error::{TrainError, TrainResult};
use std::fs;
use std::path::Path;

/// Atomically write pretty-printed JSON to `path`.
///
/// Writes to a `.tmp` sibling then renames, so a crash mid-write never
/// leaves a half-written artifact behind.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> TrainResult<()> {
    let json = serde_json::to_string_pretty(data)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to `path`, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> TrainResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TrainError::filesystem(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).map_err(|e| TrainError::filesystem(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| TrainError::filesystem(path, e))?;
    Ok(())
}
