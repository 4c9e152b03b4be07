use serde::{Deserialize, Serialize};

use crate::media::MediaId;

/// Upper bound on the measured track gain used by `GainMode::TrackGain`, in dB.
pub const MAX_GAIN: f64 = 20.0;

/// One file to analyze and the media entries that play it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub uri: String,
    /// Reference loudness handed to the backend, in dB SPL.
    pub reference_level: f64,
    pub entries: Vec<MediaId>,
}

/// Terminal outcome of one analysis job.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Success { gain: f64, peak: f64, source: String },
    Failure { source: String },
}

impl AnalysisResult {
    pub fn failure(source: impl Into<String>) -> Self {
        AnalysisResult::Failure {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            AnalysisResult::Success { source, .. } | AnalysisResult::Failure { source } => source,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }
}

/// How a measured gain/peak pair becomes a linear volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GainMode {
    /// Apply the measured track gain, capped at `MAX_GAIN` and by the inverse peak.
    TrackGain,
    /// Scale the peak to `target_level` dBFS, ignoring the measured gain.
    TargetNormalize { target_level: f64 },
}

impl GainMode {
    /// Compute the linear volume for a measurement.
    ///
    /// Returns `None` when the peak is not a finite positive amplitude.
    pub fn volume(&self, gain: f64, peak: f64) -> Option<f64> {
        if !peak.is_finite() || peak <= 0.0 {
            return None;
        }
        let volume = match *self {
            GainMode::TrackGain => (1.0 / peak).min(10f64.powf(gain.min(MAX_GAIN) / 20.0)),
            GainMode::TargetNormalize { target_level } => {
                (1.0 / peak) * 10f64.powf(target_level / 20.0)
            }
        };
        Some(volume)
    }

    pub fn label(&self) -> &'static str {
        match self {
            GainMode::TrackGain => "track gain",
            GainMode::TargetNormalize { .. } => "target normalize",
        }
    }
}

/// Sent from the dispatcher to the single progress consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Batch accepted; `total` distinct files will be analyzed.
    Started { total: usize },
    /// One file finished, successfully or not (+1).
    Tick,
    /// The batch is over, committed or aborted (-1).
    Finished,
}

impl ProgressEvent {
    /// Signed step as the progress observer counts it.
    pub fn step(&self) -> i64 {
        match self {
            ProgressEvent::Started { .. } => 0,
            ProgressEvent::Tick => 1,
            ProgressEvent::Finished => -1,
        }
    }
}

/// Per-file line of a batch report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source: String,
    pub gain: Option<f64>,
    pub peak: Option<f64>,
    pub volume: Option<f64>,
    pub entries: Vec<MediaId>,
}

impl FileOutcome {
    pub fn is_adjusted(&self) -> bool {
        self.volume.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileOutcome>,
    pub adjusted_entries: usize,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| !f.is_adjusted()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_adjusted()).count()
    }
}

/// How a batch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// All requests resolved; any adjustments went into the history.
    Completed(BatchReport),
    /// Stopped by the user; nothing was committed.
    Aborted(BatchReport),
}

impl BatchOutcome {
    pub fn report(&self) -> &BatchReport {
        match self {
            BatchOutcome::Completed(report) | BatchOutcome::Aborted(report) => report,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BatchOutcome::Completed(_))
    }
}
