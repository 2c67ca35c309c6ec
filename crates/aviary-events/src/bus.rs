use crate::dedup::{DeduplicationConfig, DeduplicationStats, ErrorDeduplicator};
use crate::types::{DetectionEvent, ErrorEvent, EventConsumer, ResourceEvent};
use aviary_foundation::AppError;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Consumers slower than this per event get logged.
const SLOW_CONSUMER_THRESHOLD: Duration = Duration::from_millis(100);

/// Cadence of the periodic bus-statistics log line.
const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub buffer_size: usize,
    /// Separate depth for resource events; falls back to `buffer_size`.
    pub resource_buffer_size: Option<usize>,
    pub workers: usize,
    pub dedup: DeduplicationConfig,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10_000,
            resource_buffer_size: None,
            workers: 4,
            dedup: DeduplicationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBusStats {
    pub events_received: u64,
    pub events_processed: u64,
    pub events_suppressed: u64,
    pub events_dropped: u64,
    pub consumer_errors: u64,
    pub fast_path_hits: u64,
}

#[derive(Default)]
struct StatCounters {
    received: AtomicU64,
    processed: AtomicU64,
    suppressed: AtomicU64,
    dropped: AtomicU64,
    consumer_errors: AtomicU64,
    fast_path_hits: AtomicU64,
}

/// Typed in-process pub/sub with non-blocking publish.
pub struct EventBus {
    error_tx: Sender<ErrorEvent>,
    resource_tx: Sender<ResourceEvent>,
    detection_tx: Sender<DetectionEvent>,
    error_rx: Receiver<ErrorEvent>,
    resource_rx: Receiver<ResourceEvent>,
    detection_rx: Receiver<DetectionEvent>,

    consumers: Mutex<Vec<Arc<dyn EventConsumer>>>,
    has_consumers: AtomicBool,
    running: AtomicBool,
    accepting: AtomicBool,

    workers: usize,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,

    deduplicator: Option<ErrorDeduplicator>,
    stats: StatCounters,
    start_time: Instant,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Arc<Self> {
        let resource_depth = config.resource_buffer_size.unwrap_or(config.buffer_size);
        let (error_tx, error_rx) = bounded(config.buffer_size);
        let (resource_tx, resource_rx) = bounded(resource_depth);
        let (detection_tx, detection_rx) = bounded(config.buffer_size);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let deduplicator = config
            .dedup
            .enabled
            .then(|| ErrorDeduplicator::new(config.dedup.clone()));

        info!(
            buffer_size = config.buffer_size,
            workers = config.workers,
            dedup = deduplicator.is_some(),
            "event bus initialized"
        );

        Arc::new(Self {
            error_tx,
            resource_tx,
            detection_tx,
            error_rx,
            resource_rx,
            detection_rx,
            consumers: Mutex::new(Vec::new()),
            has_consumers: AtomicBool::new(false),
            running: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            workers: config.workers.max(1),
            worker_handles: Mutex::new(Vec::new()),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            deduplicator,
            stats: StatCounters::default(),
            start_time: Instant::now(),
        })
    }

    /// Register a consumer by name. Re-registering an existing name is a
    /// no-op and returns false. Workers start on the first registration.
    pub fn register_consumer(self: &Arc<Self>, consumer: Arc<dyn EventConsumer>) -> bool {
        let mut consumers = self.consumers.lock();
        if consumers.iter().any(|c| c.name() == consumer.name()) {
            debug!(consumer = consumer.name(), "consumer already registered");
            return false;
        }
        info!(
            consumer = consumer.name(),
            total = consumers.len() + 1,
            "registered event consumer"
        );
        consumers.push(consumer);
        drop(consumers);

        self.has_consumers.store(true, Ordering::Release);
        self.start_workers();
        true
    }

    fn start_workers(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(count = self.workers, "starting event bus workers");
        let mut handles = self.worker_handles.lock();
        for id in 0..self.workers {
            let bus = Arc::clone(self);
            let handle = std::thread::Builder::new()
                .name(format!("event-bus-{id}"))
                .spawn(move || bus.worker_loop(id))
                .expect("spawn event bus worker");
            handles.push(handle);
        }
        let bus = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("event-bus-metrics".to_string())
            .spawn(move || bus.metrics_loop())
            .expect("spawn event bus metrics logger");
        handles.push(handle);
    }

    /// Non-blocking error publish. False when nobody is listening or the
    /// channel is full; true when enqueued or suppressed as a duplicate.
    pub fn try_publish_error(&self, event: ErrorEvent) -> bool {
        if !self.publishable() {
            return false;
        }
        if let Some(dedup) = &self.deduplicator {
            if !dedup.should_process(&event) {
                self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        self.offer(&self.error_tx, event, "error")
    }

    /// Non-blocking resource publish.
    pub fn try_publish_resource(&self, event: ResourceEvent) -> bool {
        if !self.publishable() {
            return false;
        }
        self.offer(&self.resource_tx, event, "resource")
    }

    /// Non-blocking detection publish.
    pub fn try_publish_detection(&self, event: DetectionEvent) -> bool {
        if !self.publishable() {
            return false;
        }
        self.offer(&self.detection_tx, event, "detection")
    }

    fn publishable(&self) -> bool {
        if !self.has_consumers.load(Ordering::Acquire) {
            self.stats.fast_path_hits.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.accepting.load(Ordering::Acquire)
    }

    fn offer<T>(&self, tx: &Sender<T>, event: T, family: &'static str) -> bool {
        match tx.try_send(event) {
            Ok(()) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(family, "event dropped due to full buffer");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn worker_loop(&self, id: usize) {
        debug!(worker_id = id, "event bus worker started");
        loop {
            crossbeam_channel::select! {
                recv(self.shutdown_rx) -> _ => {
                    debug!(worker_id = id, "event bus worker stopping");
                    return;
                }
                recv(self.error_rx) -> msg => match msg {
                    Ok(event) => self.fan_out(
                        |c, e: &ErrorEvent| c.process_error(e),
                        &event,
                        "error",
                    ),
                    Err(_) => return,
                },
                recv(self.resource_rx) -> msg => match msg {
                    Ok(event) => self.fan_out(
                        |c, e: &ResourceEvent| c.process_resource(e),
                        &event,
                        "resource",
                    ),
                    Err(_) => return,
                },
                recv(self.detection_rx) -> msg => match msg {
                    Ok(event) => self.fan_out(
                        |c, e: &DetectionEvent| c.process_detection(e),
                        &event,
                        "detection",
                    ),
                    Err(_) => return,
                },
            }
        }
    }

    /// Deliver one event to every consumer, each under a panic guard.
    fn fan_out<T>(
        &self,
        process: impl Fn(&dyn EventConsumer, &T) -> Result<(), String>,
        event: &T,
        family: &'static str,
    ) {
        let consumers: Vec<Arc<dyn EventConsumer>> = self.consumers.lock().clone();
        for consumer in consumers {
            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| process(consumer.as_ref(), event)));
            let elapsed = started.elapsed();

            if elapsed > SLOW_CONSUMER_THRESHOLD {
                warn!(
                    consumer = consumer.name(),
                    family,
                    duration_ms = elapsed.as_millis() as u64,
                    "slow consumer detected"
                );
            }

            match outcome {
                Ok(Ok(())) => {
                    self.stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(err)) => {
                    self.stats.consumer_errors.fetch_add(1, Ordering::Relaxed);
                    error!(consumer = consumer.name(), family, error = %err, "consumer error");
                }
                Err(_) => {
                    self.stats.consumer_errors.fetch_add(1, Ordering::Relaxed);
                    error!(consumer = consumer.name(), family, "consumer panicked");
                }
            }
        }
    }

    fn metrics_loop(&self) {
        loop {
            match self.shutdown_rx.recv_timeout(METRICS_LOG_INTERVAL) {
                Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    self.log_metrics("final");
                    return;
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    self.log_metrics("periodic");
                }
            }
        }
    }

    fn log_metrics(&self, reason: &'static str) {
        let stats = self.stats();
        let dedup = self.dedup_stats();
        let uptime = self.start_time.elapsed().as_secs_f64();
        info!(
            reason,
            events_received = stats.events_received,
            events_processed = stats.events_processed,
            events_dropped = stats.events_dropped,
            events_suppressed = stats.events_suppressed,
            consumer_errors = stats.consumer_errors,
            fast_path_hits = stats.fast_path_hits,
            dedup_seen = dedup.total_seen,
            dedup_suppressed = dedup.total_suppressed,
            uptime_hours = %format!("{:.2}", uptime / 3600.0),
            "event bus performance metrics"
        );
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            events_received: self.stats.received.load(Ordering::Relaxed),
            events_processed: self.stats.processed.load(Ordering::Relaxed),
            events_suppressed: self.stats.suppressed.load(Ordering::Relaxed),
            events_dropped: self.stats.dropped.load(Ordering::Relaxed),
            consumer_errors: self.stats.consumer_errors.load(Ordering::Relaxed),
            fast_path_hits: self.stats.fast_path_hits.load(Ordering::Relaxed),
        }
    }

    pub fn dedup_stats(&self) -> DeduplicationStats {
        self.deduplicator
            .as_ref()
            .map(|d| d.stats())
            .unwrap_or_default()
    }

    /// Stop accepting events and wait for workers up to `timeout`. Events
    /// still queued in the channels may be lost.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), AppError> {
        if !self.running.load(Ordering::SeqCst) {
            self.accepting.store(false, Ordering::Release);
            return Ok(());
        }
        info!(?timeout, "shutting down event bus");
        self.accepting.store(false, Ordering::Release);

        // Dropping the sender disconnects the shutdown channel and wakes
        // every worker.
        self.shutdown_tx.lock().take();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_handles.lock());
        let (done_tx, done_rx) = bounded::<()>(1);
        std::thread::spawn(move || {
            for handle in handles {
                let _ = handle.join();
            }
            let _ = done_tx.send(());
        });

        match done_rx.recv_timeout(timeout) {
            Ok(()) => {
                info!("event bus shutdown complete");
                Ok(())
            }
            Err(_) => {
                warn!("event bus shutdown timeout exceeded");
                Err(AppError::ShutdownTimeout {
                    component: "event-bus".to_string(),
                    timeout,
                })
            }
        }
    }
}
