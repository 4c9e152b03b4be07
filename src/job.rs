//! One file through one analysis pipeline.
//!
//! The worker running [`AnalysisJob::run`] launches a pipeline and then
//! blocks on a completion gate. The gate is opened from the backend's event
//! thread exactly once, with the job's only result.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::backend::{AnalysisBackend, BackendEvent, EventSink, Pipeline};
use crate::models::AnalysisResult;

/// Create a one-shot gate: one trigger that may fire once, one waiter.
pub fn completion_gate<T: Send>() -> (GateTrigger<T>, GateWaiter<T>) {
    let (tx, rx) = bounded(1);
    (
        GateTrigger {
            released: AtomicBool::new(false),
            tx,
        },
        GateWaiter { rx },
    )
}

/// Opening side of a completion gate.
pub struct GateTrigger<T> {
    released: AtomicBool,
    tx: Sender<T>,
}

impl<T> GateTrigger<T> {
    /// Open the gate with `value`. Only the first call has any effect;
    /// later calls return `false`.
    pub fn release(&self, value: T) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Capacity 1 and a single winner: this can only fail if the waiter is gone
        let _ = self.tx.try_send(value);
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// How a wait on a completion gate ended.
#[derive(Debug, PartialEq)]
pub enum GateOutcome<T> {
    Released(T),
    TimedOut,
    /// Every trigger was dropped without firing.
    Abandoned,
}

/// Waiting side of a completion gate.
pub struct GateWaiter<T> {
    rx: Receiver<T>,
}

impl<T> GateWaiter<T> {
    pub fn wait(self, timeout: Option<Duration>) -> GateOutcome<T> {
        match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(value) => GateOutcome::Released(value),
                Err(RecvTimeoutError::Timeout) => GateOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => GateOutcome::Abandoned,
            },
            None => match self.rx.recv() {
                Ok(value) => GateOutcome::Released(value),
                Err(_) => GateOutcome::Abandoned,
            },
        }
    }
}

/// State shared between the job and its pipeline's event sink.
struct JobState {
    uri: String,
    result: Mutex<AnalysisResult>,
    pipeline: Mutex<Option<Arc<dyn Pipeline>>>,
    stop_requested: AtomicBool,
}

impl JobState {
    fn result(&self) -> MutexGuard<'_, AnalysisResult> {
        self.result.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current pipeline handle. The lock is released before the handle is used,
    /// so a pipeline may call back into the sink from `halt`/`request_eos`.
    fn pipeline(&self) -> Option<Arc<dyn Pipeline>> {
        self.pipeline_slot().clone()
    }

    fn pipeline_slot(&self) -> MutexGuard<'_, Option<Arc<dyn Pipeline>>> {
        self.pipeline.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn halt_pipeline(&self) {
        if let Some(pipeline) = self.pipeline() {
            pipeline.halt();
        }
    }

    fn on_event(&self, event: BackendEvent, gate: &GateTrigger<AnalysisResult>) {
        match event {
            BackendEvent::Tag {
                gain: Some(gain),
                peak: Some(peak),
            } => {
                self.halt_pipeline();
                let result = AnalysisResult::Success {
                    gain,
                    peak,
                    source: self.uri.clone(),
                };
                *self.result() = result.clone();
                gate.release(result);
            }
            BackendEvent::Tag { gain, peak } => {
                debug!(uri = %self.uri, ?gain, ?peak, "incomplete replay gain tags");
            }
            BackendEvent::EndOfStream => {
                let result = self.result().clone();
                gate.release(result);
            }
            BackendEvent::Error(message) => {
                debug!(uri = %self.uri, error = %message, "pipeline error");
                self.halt_pipeline();
                let result = self.result().clone();
                gate.release(result);
            }
        }
    }
}

/// Analysis of a single file.
pub struct AnalysisJob {
    reference_level: f64,
    timeout: Option<Duration>,
    state: Arc<JobState>,
}

impl AnalysisJob {
    pub fn new(uri: impl Into<String>, reference_level: f64) -> Self {
        let uri = uri.into();
        Self {
            reference_level,
            timeout: None,
            state: Arc::new(JobState {
                result: Mutex::new(AnalysisResult::failure(uri.clone())),
                uri,
                pipeline: Mutex::new(None),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn uri(&self) -> &str {
        &self.state.uri
    }

    /// Last recorded result; a `Failure` until tags have been captured.
    pub fn snapshot(&self) -> AnalysisResult {
        self.state.result().clone()
    }

    /// Ask the running pipeline for a graceful end of stream.
    ///
    /// A job stopped before it launched never starts a pipeline.
    pub fn stop(&self) {
        let pipeline = {
            let slot = self.state.pipeline_slot();
            self.state.stop_requested.store(true, Ordering::SeqCst);
            slot.clone()
        };
        if let Some(pipeline) = pipeline {
            pipeline.request_eos();
        }
    }

    /// Analyze the file, blocking until the outcome is known.
    pub fn run(&self, backend: &dyn AnalysisBackend) -> AnalysisResult {
        let uri = self.state.uri.clone();
        if self.state.stop_requested.load(Ordering::SeqCst) {
            debug!(%uri, "stopped before start");
            return self.snapshot();
        }

        let (trigger, waiter) = completion_gate();
        let sink = self.event_sink(trigger);

        info!(%uri, "analysis started");
        match backend.launch(&uri, self.reference_level, sink) {
            Ok(pipeline) => {
                let pipeline: Arc<dyn Pipeline> = Arc::from(pipeline);
                let stopped = {
                    let mut slot = self.state.pipeline_slot();
                    *slot = Some(Arc::clone(&pipeline));
                    self.state.stop_requested.load(Ordering::SeqCst)
                };
                if stopped {
                    pipeline.request_eos();
                }
            }
            Err(e) => {
                warn!(%uri, error = %e, "failed to start analysis");
                return self.snapshot();
            }
        }

        let result = match waiter.wait(self.timeout) {
            GateOutcome::Released(result) => result,
            GateOutcome::TimedOut => {
                warn!(%uri, timeout = ?self.timeout, "analysis timed out");
                if let Some(pipeline) = self.state.pipeline() {
                    pipeline.request_eos();
                }
                self.snapshot()
            }
            GateOutcome::Abandoned => {
                warn!(%uri, "pipeline ended without reporting");
                self.snapshot()
            }
        };

        // Reset the pipe
        self.state.pipeline_slot().take();

        result
    }

    fn event_sink(&self, trigger: GateTrigger<AnalysisResult>) -> EventSink {
        let state = Arc::clone(&self.state);
        Arc::new(move |event: BackendEvent| {
            let handled = panic::catch_unwind(AssertUnwindSafe(|| state.on_event(event, &trigger)));
            if handled.is_err() {
                warn!(uri = %state.uri, "panic while handling pipeline event");
                trigger.release(AnalysisResult::failure(state.uri.clone()));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GainError, Result};

    #[test]
    fn test_gate_releases_once() {
        let (trigger, waiter) = completion_gate();
        assert!(trigger.release(1));
        assert!(!trigger.release(2));
        assert!(trigger.is_released());
        assert_eq!(waiter.wait(None), GateOutcome::Released(1));
    }

    #[test]
    fn test_gate_timeout() {
        let (_trigger, waiter) = completion_gate::<u8>();
        assert_eq!(
            waiter.wait(Some(Duration::from_millis(10))),
            GateOutcome::TimedOut
        );
    }

    #[test]
    fn test_gate_abandoned() {
        let (trigger, waiter) = completion_gate::<u8>();
        drop(trigger);
        assert_eq!(waiter.wait(None), GateOutcome::Abandoned);
    }

    #[test]
    fn test_gate_release_from_other_thread() {
        let (trigger, waiter) = completion_gate();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            trigger.release("done");
        });
        assert_eq!(waiter.wait(Some(Duration::from_secs(5))), GateOutcome::Released("done"));
    }

    /// Replays a fixed list of events from a background thread.
    struct Scripted {
        events: Vec<BackendEvent>,
    }

    struct Idle;

    impl Pipeline for Idle {
        fn request_eos(&self) {}
        fn halt(&self) {}
    }

    impl AnalysisBackend for Scripted {
        fn launch(&self, _uri: &str, _reference_level: f64, sink: EventSink) -> Result<Box<dyn Pipeline>> {
            let events = self.events.clone();
            std::thread::spawn(move || {
                for event in events {
                    sink(event);
                }
            });
            Ok(Box::new(Idle))
        }
    }

    struct Broken;

    impl AnalysisBackend for Broken {
        fn launch(&self, uri: &str, _reference_level: f64, _sink: EventSink) -> Result<Box<dyn Pipeline>> {
            Err(GainError::Pipeline(format!("cannot open {}", uri)))
        }
    }

    fn run_scripted(events: Vec<BackendEvent>) -> AnalysisResult {
        AnalysisJob::new("file:///a.wav", 89.0)
            .with_timeout(Some(Duration::from_secs(5)))
            .run(&Scripted { events })
    }

    #[test]
    fn test_tags_give_success() {
        let result = run_scripted(vec![
            BackendEvent::Tag {
                gain: Some(-3.5),
                peak: Some(0.9),
            },
            BackendEvent::EndOfStream,
        ]);
        assert_eq!(
            result,
            AnalysisResult::Success {
                gain: -3.5,
                peak: 0.9,
                source: "file:///a.wav".to_string()
            }
        );
    }

    #[test]
    fn test_eos_without_tags_is_failure() {
        let result = run_scripted(vec![
            BackendEvent::Tag {
                gain: None,
                peak: Some(0.0),
            },
            BackendEvent::EndOfStream,
        ]);
        assert_eq!(result, AnalysisResult::failure("file:///a.wav"));
    }

    #[test]
    fn test_error_is_failure() {
        let result = run_scripted(vec![BackendEvent::Error("bad header".to_string())]);
        assert_eq!(result, AnalysisResult::failure("file:///a.wav"));
    }

    #[test]
    fn test_silent_pipeline_is_abandoned_failure() {
        // Sink dropped without a single event: the worker must still be released
        let result = run_scripted(vec![]);
        assert_eq!(result, AnalysisResult::failure("file:///a.wav"));
    }

    #[test]
    fn test_launch_error_is_failure() {
        let job = AnalysisJob::new("file:///missing.wav", 89.0);
        assert_eq!(job.run(&Broken), AnalysisResult::failure("file:///missing.wav"));
    }

    #[test]
    fn test_stop_before_run_never_launches() {
        let job = AnalysisJob::new("file:///a.wav", 89.0);
        job.stop();
        // Broken would log a launch failure; a stopped job must not even try
        assert!(!job.run(&Broken).is_success());
    }

    #[test]
    fn test_timeout_releases_worker() {
        struct Hang;
        impl AnalysisBackend for Hang {
            fn launch(&self, _uri: &str, _level: f64, sink: EventSink) -> Result<Box<dyn Pipeline>> {
                // Keep the sink alive forever without sending anything
                std::mem::forget(sink);
                Ok(Box::new(Idle))
            }
        }
        let job = AnalysisJob::new("file:///slow.wav", 89.0)
            .with_timeout(Some(Duration::from_millis(20)));
        assert_eq!(job.run(&Hang), AnalysisResult::failure("file:///slow.wav"));
    }

    #[test]
    fn test_snapshot_keeps_success() {
        let job = AnalysisJob::new("file:///a.wav", 89.0).with_timeout(Some(Duration::from_secs(5)));
        job.run(&Scripted {
            events: vec![BackendEvent::Tag {
                gain: Some(1.0),
                peak: Some(0.5),
            }],
        });
        assert!(job.snapshot().is_success());
    }

    struct PanicOnHalt;

    impl Pipeline for PanicOnHalt {
        fn request_eos(&self) {}
        fn halt(&self) {
            panic!("halt failed");
        }
    }

    /// Sends complete tags once the job has had time to store the pipeline.
    struct TagsAfterDelay;

    impl AnalysisBackend for TagsAfterDelay {
        fn launch(&self, _uri: &str, _level: f64, sink: EventSink) -> Result<Box<dyn Pipeline>> {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                sink(BackendEvent::Tag {
                    gain: Some(2.0),
                    peak: Some(0.5),
                });
            });
            Ok(Box::new(PanicOnHalt))
        }
    }

    #[test]
    fn test_panic_in_event_handling_releases_failure() {
        let job = AnalysisJob::new("file:///a.wav", 89.0).with_timeout(Some(Duration::from_secs(5)));
        let started = std::time::Instant::now();
        assert_eq!(job.run(&TagsAfterDelay), AnalysisResult::failure("file:///a.wav"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// Pipeline that only finishes once asked for end of stream.
    struct UntilEos {
        eos: Arc<AtomicBool>,
    }

    impl Pipeline for UntilEos {
        fn request_eos(&self) {
            self.eos.store(true, Ordering::SeqCst);
        }
        fn halt(&self) {
            self.eos.store(true, Ordering::SeqCst);
        }
    }

    /// Optionally sends complete tags, signals `ready`, then holds the stream
    /// open until end of stream is requested.
    struct HoldOpen {
        tags: bool,
        ready: Sender<()>,
    }

    impl AnalysisBackend for HoldOpen {
        fn launch(&self, _uri: &str, _level: f64, sink: EventSink) -> Result<Box<dyn Pipeline>> {
            let eos = Arc::new(AtomicBool::new(false));
            let pipeline = UntilEos { eos: Arc::clone(&eos) };
            let tags = self.tags;
            let ready = self.ready.clone();
            std::thread::spawn(move || {
                if tags {
                    sink(BackendEvent::Tag {
                        gain: Some(-1.5),
                        peak: Some(0.8),
                    });
                }
                let _ = ready.send(());
                while !eos.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                sink(BackendEvent::EndOfStream);
            });
            Ok(Box::new(pipeline))
        }
    }

    fn run_then_stop(tags: bool) -> AnalysisResult {
        let (ready_tx, ready_rx) = bounded(1);
        let backend = HoldOpen { tags, ready: ready_tx };
        let job = AnalysisJob::new("file:///a.wav", 89.0).with_timeout(Some(Duration::from_secs(5)));
        std::thread::scope(|s| {
            let running = s.spawn(|| job.run(&backend));
            ready_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            job.stop();
            running.join().unwrap()
        })
    }

    #[test]
    fn test_stop_after_tags_keeps_success() {
        assert_eq!(
            run_then_stop(true),
            AnalysisResult::Success {
                gain: -1.5,
                peak: 0.8,
                source: "file:///a.wav".to_string()
            }
        );
    }

    #[test]
    fn test_stop_before_tags_is_failure() {
        assert_eq!(run_then_stop(false), AnalysisResult::failure("file:///a.wav"));
    }
}
