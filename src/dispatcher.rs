//! Bounded pool of analysis workers plus the supervisor that collects their
//! results.
//!
//! ```text
//!                 ┌──────────┐  AnalysisResult   ┌────────────┐   Tick/Finished
//!  requests ───►  │ workers  │ ────────────────► │ supervisor │ ──────────────► observer
//!  (shared index) │  (≤ K)   │  completion order │ aggregator │
//!                 └──────────┘                   └─────┬──────┘
//!                                                      │ commit (unless stopped)
//!                                                      ▼
//!                                                ActionHistory
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::action::ActionHistory;
use crate::aggregator::ResultAggregator;
use crate::backend::AnalysisBackend;
use crate::config::GainConfig;
use crate::error::{GainError, Result};
use crate::job::AnalysisJob;
use crate::media::MediaStore;
use crate::models::{AnalysisRequest, AnalysisResult, BatchOutcome, GainMode, ProgressEvent};
use crate::progress::ProgressSender;

type InflightJobs = Arc<Mutex<HashMap<usize, Arc<AnalysisJob>>>>;

fn lock_jobs(jobs: &InflightJobs) -> MutexGuard<'_, HashMap<usize, Arc<AnalysisJob>>> {
    jobs.lock().unwrap_or_else(|e| e.into_inner())
}

/// Collaborators a batch works against.
#[derive(Clone)]
pub struct BatchContext {
    pub backend: Arc<dyn AnalysisBackend>,
    pub store: Arc<dyn MediaStore>,
    pub history: Arc<Mutex<ActionHistory>>,
    pub progress: ProgressSender,
}

/// Cloneable handle that can stop a running batch from any thread.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    inflight: InflightJobs,
}

impl StopHandle {
    /// Stop the batch: no new jobs start, running jobs are asked to end
    /// gracefully, and nothing will be committed.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let jobs: Vec<Arc<AnalysisJob>> = lock_jobs(&self.inflight).values().cloned().collect();
        debug!(in_flight = jobs.len(), "stopping batch");
        for job in jobs {
            job.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Runs one gain batch on a background supervisor thread.
pub struct JobDispatcher {
    handle: StopHandle,
    supervisor: Option<JoinHandle<BatchOutcome>>,
}

impl JobDispatcher {
    /// Validate `config` and start analyzing `requests`.
    pub fn start(
        requests: Vec<AnalysisRequest>,
        config: &GainConfig,
        context: BatchContext,
    ) -> Result<Self> {
        config.validate()?;

        let handle = StopHandle {
            running: Arc::new(AtomicBool::new(true)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        };
        let batch = Batch {
            requests: merge_requests(requests),
            concurrency: config.concurrency,
            mode: config.mode,
            job_timeout: config.job_timeout,
            handle: handle.clone(),
            context,
        };

        let supervisor = std::thread::Builder::new()
            .name("rgain-supervisor".to_string())
            .spawn(move || batch.supervise())?;

        Ok(Self {
            handle,
            supervisor: Some(supervisor),
        })
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.supervisor
            .as_ref()
            .map(|s| s.is_finished())
            .unwrap_or(true)
    }

    /// Wait for the batch to end and return how it ended.
    pub fn join(mut self) -> Result<BatchOutcome> {
        let supervisor = self
            .supervisor
            .take()
            .ok_or_else(|| GainError::Pipeline("batch already joined".to_string()))?;
        supervisor
            .join()
            .map_err(|_| GainError::Pipeline("batch supervisor panicked".to_string()))
    }
}

/// Fold requests for the same URI into one, so each file is analyzed once.
fn merge_requests(requests: Vec<AnalysisRequest>) -> Vec<AnalysisRequest> {
    let mut merged: Vec<AnalysisRequest> = Vec::with_capacity(requests.len());
    let mut by_uri: HashMap<String, usize> = HashMap::new();
    for request in requests {
        match by_uri.get(&request.uri) {
            Some(&idx) => {
                let entries = &mut merged[idx].entries;
                for entry in request.entries {
                    if !entries.contains(&entry) {
                        entries.push(entry);
                    }
                }
            }
            None => {
                by_uri.insert(request.uri.clone(), merged.len());
                merged.push(request);
            }
        }
    }
    merged
}

struct Batch {
    requests: Vec<AnalysisRequest>,
    concurrency: usize,
    mode: GainMode,
    job_timeout: Option<Duration>,
    handle: StopHandle,
    context: BatchContext,
}

impl Batch {
    fn supervise(self) -> BatchOutcome {
        let total = self.requests.len();
        let progress = self.context.progress.clone();
        progress.send(ProgressEvent::Started { total });
        info!(files = total, jobs = self.concurrency, mode = self.mode.label(), "replay gain started");

        let mut aggregator = ResultAggregator::new(
            self.mode,
            &self.requests,
            Arc::clone(&self.context.store),
            progress.clone(),
        );

        let requests = Arc::new(self.requests);
        let next_index = Arc::new(AtomicUsize::new(0));
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<AnalysisResult>();

        let mut workers = Vec::new();
        for _ in 0..self.concurrency.max(1).min(total) {
            let worker = Worker {
                requests: Arc::clone(&requests),
                next_index: Arc::clone(&next_index),
                handle: self.handle.clone(),
                backend: Arc::clone(&self.context.backend),
                job_timeout: self.job_timeout,
                results: result_tx.clone(),
            };
            workers.push(std::thread::spawn(move || worker.run()));
        }
        drop(result_tx);

        // Completion order; the channel closes once every worker has exited
        for result in result_rx.iter() {
            if self.handle.is_running() {
                aggregator.process(result);
            } else {
                debug!(uri = %result.source(), "discarding result of stopped batch");
            }
        }

        for worker in workers {
            if worker.join().is_err() {
                error!("analysis worker panicked");
            }
        }

        let (action, report) = aggregator.into_parts();
        let outcome = if self.handle.is_running() {
            if action.is_empty() {
                debug!("no volumes to adjust");
            } else {
                let mut history = self.context.history.lock().unwrap_or_else(|e| e.into_inner());
                history.commit(Box::new(action));
            }
            info!(
                succeeded = report.succeeded_count(),
                failed = report.failed_count(),
                "replay gain finished"
            );
            BatchOutcome::Completed(report)
        } else {
            info!("replay gain stopped by user");
            BatchOutcome::Aborted(report)
        };

        progress.send(ProgressEvent::Finished);
        outcome
    }
}

struct Worker {
    requests: Arc<Vec<AnalysisRequest>>,
    next_index: Arc<AtomicUsize>,
    handle: StopHandle,
    backend: Arc<dyn AnalysisBackend>,
    job_timeout: Option<Duration>,
    results: crossbeam_channel::Sender<AnalysisResult>,
}

impl Worker {
    fn run(self) {
        loop {
            if !self.handle.is_running() {
                break;
            }
            let index = self.next_index.fetch_add(1, Ordering::SeqCst);
            let Some(request) = self.requests.get(index) else {
                break;
            };

            let job = Arc::new(
                AnalysisJob::new(request.uri.clone(), request.reference_level)
                    .with_timeout(self.job_timeout),
            );
            lock_jobs(&self.handle.inflight).insert(index, Arc::clone(&job));
            // A stop that raced with registration did not see this job
            if !self.handle.is_running() {
                job.stop();
            }

            let result = match panic::catch_unwind(AssertUnwindSafe(|| job.run(self.backend.as_ref()))) {
                Ok(result) => result,
                Err(_) => {
                    error!(uri = %request.uri, "analysis job panicked, using last known result");
                    job.snapshot()
                }
            };

            lock_jobs(&self.handle.inflight).remove(&index);
            if self.results.send(result).is_err() {
                break;
            }
        }
    }
}
