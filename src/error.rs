use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Failures raised while configuring, decoding or running a spectral analysis.
///
/// `TaskTimeout` and `TaskFailed` are soft: they are collected in
/// [`AnalysisRun::failures`](crate::analysis::AnalysisRun) and the partial
/// aggregate is still reported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unsupported block size {size}: {reason}")]
    UnsupportedBlockSize { size: usize, reason: String },

    #[error("non-finite sample at index {index} of block")]
    NonFiniteSample { index: usize },

    #[error("failed to decode {}: {reason}", .path.display())]
    DecodeFailure { path: PathBuf, reason: String },

    /// Parallel run did not finish before the deadline; analysis may be incomplete.
    #[error(
        "worker pool did not finish within {timeout:?} ({completed}/{total} blocks aggregated)"
    )]
    TaskTimeout {
        timeout: Duration,
        completed: usize,
        total: usize,
    },

    #[error("block at offset {offset} failed: {reason}")]
    TaskFailed { offset: usize, reason: String },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("failed to write {}: {reason}", .path.display())]
    OutputFailure { path: PathBuf, reason: String },
}

impl AnalysisError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DecodeFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn output(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::OutputFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
