//! Progress stream from a running batch to its single observer.
//!
//! Workers never talk to the observer directly: every event is sent by the
//! dispatcher's supervisor thread, and the receiving half cannot be cloned, so
//! delivery is serialized onto one consumer.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::models::ProgressEvent;

/// Create a connected progress sender/receiver pair.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Send an event; a departed observer is not an error.
    pub fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Result of waiting a bounded time for the next event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPoll {
    Event(ProgressEvent),
    /// Nothing arrived before the timeout.
    Idle,
    /// The batch is gone and no events remain.
    Closed,
}

#[derive(Debug)]
pub struct ProgressReceiver {
    rx: Receiver<ProgressEvent>,
}

impl ProgressReceiver {
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> ProgressPoll {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => ProgressPoll::Event(event),
            Err(RecvTimeoutError::Timeout) => ProgressPoll::Idle,
            Err(RecvTimeoutError::Disconnected) => ProgressPoll::Closed,
        }
    }

    /// Block until the batch finishes, returning every event in arrival order.
    pub fn collect_until_finished(&self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.recv() {
            events.push(event);
            if event == ProgressEvent::Finished {
                break;
            }
        }
        events
    }
}

/// Running tally of a progress stream, as a progress bar would keep it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTally {
    pub total: usize,
    pub completed: usize,
    pub finished: bool,
}

impl ProgressTally {
    pub fn record(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { total } => self.total = total,
            ProgressEvent::Tick => self.completed += 1,
            ProgressEvent::Finished => self.finished = true,
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            if self.finished {
                1.0
            } else {
                0.0
            }
        } else {
            (self.completed as f64 / self.total as f64).min(1.0)
        }
    }
}
