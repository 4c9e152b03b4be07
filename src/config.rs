use std::time::Duration;

use crate::error::{GainError, Result};
use crate::models::GainMode;

/// ReplayGain reference loudness, in dB SPL.
pub const DEFAULT_REFERENCE_LEVEL: f64 = 89.0;

/// Target peak level used by `TargetNormalize` when none is given, in dBFS.
pub const DEFAULT_TARGET_LEVEL: f64 = -14.0;

/// Per-job analysis timeout used when none is given.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Return the default number of parallel jobs (number of CPU cores).
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Options of one gain batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GainConfig {
    /// Number of analysis jobs allowed to run at once.
    pub concurrency: usize,
    pub mode: GainMode,
    /// Reference loudness handed to the analysis backend, in dB SPL.
    pub reference_level: f64,
    /// Give up on a file after this long; `None` waits forever.
    pub job_timeout: Option<Duration>,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            concurrency: default_jobs(),
            mode: GainMode::TrackGain,
            reference_level: DEFAULT_REFERENCE_LEVEL,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
        }
    }
}

impl GainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(GainError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if !self.reference_level.is_finite() {
            return Err(GainError::InvalidConfig(format!(
                "reference level must be finite, got {}",
                self.reference_level
            )));
        }
        if let GainMode::TargetNormalize { target_level } = self.mode {
            if !target_level.is_finite() {
                return Err(GainError::InvalidConfig(format!(
                    "target level must be finite, got {}",
                    target_level
                )));
            }
        }
        if self.job_timeout == Some(Duration::ZERO) {
            return Err(GainError::InvalidConfig(
                "job timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
