use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::models::{BatchOutcome, GainMode, ProgressEvent};
use crate::progress::ProgressTally;

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Main,
    About,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunState {
    Running,
    /// Stop requested; waiting for in-flight jobs to wind down.
    Stopping,
    Finished { stopped: bool },
}

pub struct App {
    pub path: PathBuf,
    pub mode: GainMode,
    pub jobs: usize,
    pub tally: ProgressTally,
    pub state: RunState,
    pub view: View,
    pub should_quit: bool,
    pub started: Instant,
    pub elapsed: Option<Duration>,
}

impl App {
    pub fn new(path: PathBuf, mode: GainMode, jobs: usize) -> Self {
        Self {
            path,
            mode,
            jobs,
            tally: ProgressTally::default(),
            state: RunState::Running,
            view: View::Main,
            should_quit: false,
            started: Instant::now(),
            elapsed: None,
        }
    }

    pub fn on_progress(&mut self, event: ProgressEvent) {
        self.tally.record(event);
        if event == ProgressEvent::Finished && self.elapsed.is_none() {
            self.elapsed = Some(self.started.elapsed());
        }
    }

    /// Record how the batch actually ended. A late stop request does not
    /// undo a batch that had already committed.
    pub fn on_outcome(&mut self, outcome: &BatchOutcome) {
        self.state = RunState::Finished {
            stopped: !outcome.is_completed(),
        };
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.elapsed());
        }
    }

    /// Mark a stop request. Returns `true` if the batch was still running.
    pub fn request_stop(&mut self) -> bool {
        if self.state == RunState::Running {
            self.state = RunState::Stopping;
            true
        } else {
            false
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Finished { .. })
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    pub fn toggle_about(&mut self) {
        self.view = match self.view {
            View::Main => View::About,
            View::About => View::Main,
        };
    }
}
