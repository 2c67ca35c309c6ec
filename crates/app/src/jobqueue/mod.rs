//! Bounded FIFO job queue with a fixed worker pool.
//!
//! Enqueue never blocks: a full queue rejects the newest task and the
//! caller drops it. Failed actions are rescheduled with exponential backoff
//! when, and only when, their error kind is retryable and the action's
//! retry policy allows it.

use crate::actions::{Action, ActionContext};
use crate::config::RetrySettings;
use crate::notes::Detection;
use aviary_foundation::{AppError, Categorized, SharedClock};
use aviary_telemetry::PipelineMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-action retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Backoff before retry number `attempts + 1`:
    /// `min(max_delay, initial_delay * multiplier^attempts)`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = self.multiplier.powi(attempts as i32);
        let delay = self.initial_delay.mul_f64(factor.max(0.0));
        delay.min(self.max_delay)
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_retries: settings.max_retries,
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            multiplier: settings.backoff_multiplier,
        }
    }
}

/// Unit of work: one action applied to one detection.
pub struct Task {
    pub action: Action,
    pub detection: Detection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Abandoned,
}

struct Job {
    task: Task,
    attempts: u32,
    state: JobState,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("worker queue is full")]
    QueueFull,
    #[error("job queue is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub abandoned: u64,
}

pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    rx: Arc<AsyncMutex<mpsc::Receiver<Job>>>,
    accepting: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    worker_count: usize,
    worker_handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    metrics: Arc<PipelineMetrics>,
    clock: SharedClock,
}

impl JobQueue {
    pub fn new(
        capacity: usize,
        worker_count: usize,
        metrics: Arc<PipelineMetrics>,
        clock: SharedClock,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
            accepting: Arc::new(AtomicBool::new(true)),
            shutdown_tx,
            worker_count: worker_count.max(1),
            worker_handles: parking_lot::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            metrics,
            clock,
        })
    }

    /// Spawn the worker pool. Safe to call once; later calls are no-ops.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(workers = self.worker_count, "starting job queue workers");
        let mut handles = self.worker_handles.lock();
        for id in 0..self.worker_count {
            let queue = Arc::clone(self);
            handles.push(tokio::spawn(async move { queue.worker_loop(id).await }));
        }
    }

    /// Non-blocking enqueue. A full queue rejects the task; the caller
    /// logs and drops it, there is no retry of the enqueue itself.
    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(QueueError::ShuttingDown);
        }
        let job = Job {
            task,
            attempts: 0,
            state: JobState::Pending,
        };
        match self.tx.try_send(job) {
            Ok(()) => {
                self.metrics.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.jobs_dropped.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::ShuttingDown),
        }
    }

    pub fn stats(&self) -> JobStatsSnapshot {
        JobStatsSnapshot {
            enqueued: self.metrics.jobs_enqueued.load(Ordering::Relaxed),
            dropped: self.metrics.jobs_dropped.load(Ordering::Relaxed),
            succeeded: self.metrics.jobs_succeeded.load(Ordering::Relaxed),
            failed: self.metrics.jobs_failed.load(Ordering::Relaxed),
            retried: self.metrics.jobs_retried.load(Ordering::Relaxed),
            abandoned: self.metrics.jobs_abandoned.load(Ordering::Relaxed),
        }
    }

    async fn worker_loop(self: Arc<Self>, id: usize) {
        debug!(worker_id = id, "job queue worker started");
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let job = {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!(worker_id = id, "job queue worker stopping");
                        return;
                    }
                    maybe = rx.recv() => match maybe {
                        Some(job) => job,
                        None => return,
                    },
                }
            };
            self.process_job(job).await;
        }
    }

    async fn process_job(&self, mut job: Job) {
        job.state = JobState::Running;
        let description = job.task.action.description();
        let ctx = ActionContext {
            clock: self.clock.clone(),
        };

        match job.task.action.execute(&ctx, &job.task.detection).await {
            Ok(()) => {
                job.state = JobState::Succeeded;
                self.metrics.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                let retry = job.task.action.retry_config();
                let retryable = retry.enabled && err.kind().is_retryable();
                if retryable && job.attempts < retry.max_retries {
                    let delay = retry.delay_for(job.attempts);
                    job.attempts += 1;
                    job.state = JobState::Pending;
                    self.metrics.jobs_retried.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        action = %description,
                        attempt = job.attempts,
                        max_retries = retry.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "action failed, scheduling retry"
                    );
                    self.schedule_retry(job, delay);
                } else if retryable {
                    job.state = JobState::Failed;
                    self.metrics.jobs_failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        action = %description,
                        attempts = job.attempts + 1,
                        error = %err,
                        "action failed, retries exhausted"
                    );
                } else {
                    job.state = JobState::Abandoned;
                    self.metrics.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
                    error!(
                        action = %description,
                        kind = %err.kind(),
                        error = %err,
                        "action failed with non-retryable error, abandoning"
                    );
                }
            }
        }
    }

    fn schedule_retry(&self, job: Job, delay: Duration) {
        let tx = self.tx.clone();
        let accepting = Arc::clone(&self.accepting);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !accepting.load(Ordering::Acquire) {
                metrics.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
                return;
            }
            debug!(state = ?job.state, attempt = job.attempts, "re-enqueueing retried job");
            if tx.try_send(job).is_err() {
                metrics.jobs_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("retry re-enqueue failed, queue full; dropping job");
            }
        });
    }

    /// Stop accepting tasks, signal workers to finish their in-flight job,
    /// wait up to `timeout`, and abandon whatever is still queued.
    pub async fn stop_with_timeout(&self, timeout: Duration) -> Result<(), AppError> {
        info!(?timeout, "stopping job queue");
        self.accepting.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_handles.lock());
        let deadline = tokio::time::Instant::now() + timeout;
        let mut timed_out = false;
        for handle in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => {}
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        // Whatever is still queued is logged and abandoned.
        if let Ok(mut rx) = self.rx.try_lock() {
            while let Ok(job) = rx.try_recv() {
                self.metrics.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
                warn!(action = %job.task.action.description(), "abandoning queued job on shutdown");
            }
        }

        if timed_out {
            warn!("job queue shutdown timed out");
            return Err(AppError::ShutdownTimeout {
                component: "jobqueue".to_string(),
                timeout,
            });
        }
        info!("job queue stopped");
        Ok(())
    }
}
