use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::action::VolumeAdjustmentAction;
use crate::media::{MediaId, MediaStore};
use crate::models::{
    AnalysisRequest, AnalysisResult, BatchReport, FileOutcome, GainMode, ProgressEvent,
};
use crate::progress::ProgressSender;

/// Turns analysis results into a pending volume adjustment.
///
/// Results may arrive in any order; each one produces exactly one progress tick.
pub struct ResultAggregator {
    mode: GainMode,
    files: HashMap<String, Vec<MediaId>>,
    action: VolumeAdjustmentAction,
    progress: ProgressSender,
    report: BatchReport,
}

impl ResultAggregator {
    pub fn new(
        mode: GainMode,
        requests: &[AnalysisRequest],
        store: Arc<dyn MediaStore>,
        progress: ProgressSender,
    ) -> Self {
        let files = requests
            .iter()
            .map(|r| (r.uri.clone(), r.entries.clone()))
            .collect();
        Self {
            mode,
            files,
            action: VolumeAdjustmentAction::new(store),
            progress,
            report: BatchReport::default(),
        }
    }

    pub fn process(&mut self, result: AnalysisResult) {
        let outcome = match result {
            AnalysisResult::Success { gain, peak, source } => self.apply(gain, peak, source),
            AnalysisResult::Failure { source } => {
                error!(uri = %source, "replay gain failed");
                FileOutcome {
                    entries: self.entries_of(&source),
                    source,
                    gain: None,
                    peak: None,
                    volume: None,
                }
            }
        };
        self.report.files.push(outcome);
        self.progress.send(ProgressEvent::Tick);
    }

    fn apply(&mut self, gain: f64, peak: f64, source: String) -> FileOutcome {
        let entries = self.entries_of(&source);
        let volume = self.mode.volume(gain, peak);

        match volume {
            Some(volume) => {
                for entry in &entries {
                    if self.action.add_media(entry, volume) {
                        self.report.adjusted_entries += 1;
                    } else {
                        warn!(uri = %source, entry = %entry, "entry has no volume control");
                    }
                }
                info!(uri = %source, gain, peak, volume, "replay gain completed");
            }
            None => error!(uri = %source, peak, "replay gain failed: unusable peak"),
        }

        FileOutcome {
            source,
            gain: Some(gain),
            peak: Some(peak),
            volume,
            entries,
        }
    }

    fn entries_of(&self, source: &str) -> Vec<MediaId> {
        match self.files.get(source) {
            Some(entries) => entries.clone(),
            None => {
                warn!(uri = %source, "result for a file that was not requested");
                Vec::new()
            }
        }
    }

    /// Number of results processed so far.
    pub fn processed(&self) -> usize {
        self.report.files.len()
    }

    pub fn into_parts(self) -> (VolumeAdjustmentAction, BatchReport) {
        (self.action, self.report)
    }
}
