//! Block-windowed spectral averaging.
//!
//! Samples are cut into overlapping blocks ([`window`]), each block is
//! transformed ([`transform`]) and mapped to `(frequency, amplitude)` pairs
//! ([`bins`]), and the pairs are averaged per bin ([`aggregate`]). The
//! [`scheduler`] drives this either on the calling thread or on a fixed
//! worker pool; [`report`] filters the averages by threshold.

pub mod aggregate;
pub mod bins;
pub mod report;
pub mod scheduler;
pub mod transform;
pub mod window;

use std::time::Duration;

use crate::error::{AnalysisError, AnalysisResult};

pub use aggregate::Snapshot;
pub use report::{report, BinAverage, ReportOrder};
pub use scheduler::run;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Validated, immutable settings for one analysis run.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    pub block_size: usize,
    pub hop_size: usize,
    pub threshold: f64,
    /// `1` selects the sequential scheduler unless `parallel` is set.
    pub workers: usize,
    /// Bound on the parallel scheduler's wait for outstanding blocks.
    pub timeout: Duration,
    /// Reject block sizes that are not a power of two.
    pub power_of_two: bool,
    /// Use the worker pool even with a single worker.
    pub parallel: bool,
}

impl AnalysisConfig {
    /// Validates raw (possibly negative) user input.
    pub fn new(
        block_size: i64,
        hop_size: i64,
        threshold: f64,
        workers: i64,
        timeout: Duration,
    ) -> AnalysisResult<Self> {
        let block_size = positive("block size", block_size)?;
        let hop_size = positive("hop size", hop_size)?;
        let workers = positive("worker count", workers)?;
        if !threshold.is_finite() {
            return Err(AnalysisError::invalid(format!(
                "threshold must be finite, got {threshold}"
            )));
        }
        Ok(Self {
            block_size,
            hop_size,
            threshold,
            workers,
            timeout,
            power_of_two: false,
            parallel: false,
        })
    }

    pub fn with_power_of_two(mut self, enabled: bool) -> Self {
        self.power_of_two = enabled;
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel || self.workers > 1
    }
}

fn positive(name: &str, value: i64) -> AnalysisResult<usize> {
    if value <= 0 {
        return Err(AnalysisError::invalid(format!(
            "{name} must be positive, got {value}"
        )));
    }
    usize::try_from(value)
        .map_err(|_| AnalysisError::invalid(format!("{name} is too large: {value}")))
}

/// Outcome of one scheduler run.
#[derive(Debug)]
pub struct AnalysisRun {
    pub snapshot: Snapshot,
    pub blocks_total: usize,
    pub blocks_completed: usize,
    /// Soft failures: timed-out pool, failed blocks.
    pub failures: Vec<AnalysisError>,
    pub elapsed: Duration,
}

impl AnalysisRun {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.blocks_completed == self.blocks_total
    }

    pub fn timed_out(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f, AnalysisError::TaskTimeout { .. }))
    }
}
