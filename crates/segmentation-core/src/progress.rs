//! Per-frame progress reporting
//!
//! The batch harness polls a small progress file while the job runs. Each
//! report replaces the previous one; nothing is appended.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Snapshot of run progress after a frame completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub elapsed_seconds: f64,
    pub completed_frames: u64,
    pub total_frames: u64,
    /// Percent complete, one decimal
    pub progress: f64,
    /// Estimated seconds until the declared total is reached, one decimal
    pub remaining_seconds: f64,
}

impl ProgressRecord {
    #[must_use]
    pub fn new(elapsed_seconds: f64, completed_frames: u64, total_frames: u64) -> Self {
        let progress = if total_frames == 0 {
            0.0
        } else {
            round_to(100.0 * completed_frames as f64 / total_frames as f64, 1)
        };
        let remaining_seconds = if completed_frames == 0 {
            0.0
        } else {
            let per_frame = elapsed_seconds / completed_frames as f64;
            round_to(
                per_frame * total_frames.saturating_sub(completed_frames) as f64,
                1,
            )
        };
        Self {
            elapsed_seconds,
            completed_frames,
            total_frames,
            progress,
            remaining_seconds,
        }
    }
}

/// Round `value` to `decimals` decimal places (half away from zero)
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Receives a progress snapshot after every frame
pub trait ProgressReporter {
    /// Replace the previously reported state with `record`
    ///
    /// # Errors
    ///
    /// Errors are reported to the caller, which treats them as non-fatal.
    fn report(&mut self, record: &ProgressRecord) -> Result<(), PipelineError>;
}

impl<T: ProgressReporter + ?Sized> ProgressReporter for Box<T> {
    fn report(&mut self, record: &ProgressRecord) -> Result<(), PipelineError> {
        (**self).report(record)
    }
}

/// Reporter that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _record: &ProgressRecord) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Writes each snapshot as JSON, replacing the file atomically
#[derive(Debug, Clone)]
pub struct FileProgressReporter {
    path: PathBuf,
    staging: PathBuf,
}

impl FileProgressReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        Self {
            path,
            staging: PathBuf::from(staging),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the last written snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not a progress record.
    pub fn read(path: &Path) -> Result<ProgressRecord, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl ProgressReporter for FileProgressReporter {
    fn report(&mut self, record: &ProgressRecord) -> Result<(), PipelineError> {
        let contents = serde_json::to_string(record)?;
        std::fs::write(&self.staging, contents)?;
        std::fs::rename(&self.staging, &self.path)?;
        Ok(())
    }
}
