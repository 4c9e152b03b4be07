//! Replay gain volume normalization for media sessions.
//!
//! A batch analyzes every distinct source file of a session on a bounded pool
//! of workers, turns each file's gain/peak measurement into a linear volume,
//! and commits all the changes as one undoable action.

pub mod action;
pub mod aggregator;
pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod format;
pub mod job;
pub mod media;
pub mod models;
pub mod progress;
pub mod session;
pub mod tui;

pub use action::{Action, ActionHistory, PendingAdjustment, VolumeAdjustmentAction};
pub use aggregator::ResultAggregator;
pub use backend::{AnalysisBackend, BackendEvent, EventSink, Pipeline, SymphoniaBackend};
pub use config::GainConfig;
pub use dispatcher::{BatchContext, JobDispatcher, StopHandle};
pub use error::{GainError, Result};
pub use job::AnalysisJob;
pub use media::{MediaId, MediaStore, VolumeControl};
pub use models::{AnalysisRequest, AnalysisResult, BatchOutcome, BatchReport, GainMode, ProgressEvent};
pub use session::Session;
