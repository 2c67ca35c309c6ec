use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a pending detection was dropped at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    FalsePositive,
    PrivacyFilter,
    DogBark,
}

/// Shared metrics for cross-thread pipeline monitoring.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Capture buffer
    pub capture_writes: Arc<AtomicU64>,
    pub capture_wraparounds: Arc<AtomicU64>,
    pub capture_misaligned_writes: Arc<AtomicU64>,
    pub capture_segment_reads: Arc<AtomicU64>,
    pub capture_segment_read_errors: Arc<AtomicU64>,

    // Rate tracking (per second * 10 for one decimal of precision)
    pub capture_write_fps: Arc<AtomicU64>,
    pub results_fps: Arc<AtomicU64>,

    // Detection aggregator
    pub results_processed: Arc<AtomicU64>,
    pub detections_pending: Arc<AtomicUsize>,
    pub detections_confirmed: Arc<AtomicU64>,
    pub detections_discarded_false_positive: Arc<AtomicU64>,
    pub detections_discarded_privacy: Arc<AtomicU64>,
    pub detections_discarded_dog_bark: Arc<AtomicU64>,
    pub classifier_process_time_ms: Arc<AtomicU64>,

    // Job queue
    pub jobs_enqueued: Arc<AtomicU64>,
    pub jobs_dropped: Arc<AtomicU64>,
    pub jobs_succeeded: Arc<AtomicU64>,
    pub jobs_failed: Arc<AtomicU64>,
    pub jobs_retried: Arc<AtomicU64>,
    pub jobs_abandoned: Arc<AtomicU64>,

    // Activity
    pub last_detection_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            capture_writes: Arc::new(AtomicU64::new(0)),
            capture_wraparounds: Arc::new(AtomicU64::new(0)),
            capture_misaligned_writes: Arc::new(AtomicU64::new(0)),
            capture_segment_reads: Arc::new(AtomicU64::new(0)),
            capture_segment_read_errors: Arc::new(AtomicU64::new(0)),

            capture_write_fps: Arc::new(AtomicU64::new(0)),
            results_fps: Arc::new(AtomicU64::new(0)),

            results_processed: Arc::new(AtomicU64::new(0)),
            detections_pending: Arc::new(AtomicUsize::new(0)),
            detections_confirmed: Arc::new(AtomicU64::new(0)),
            detections_discarded_false_positive: Arc::new(AtomicU64::new(0)),
            detections_discarded_privacy: Arc::new(AtomicU64::new(0)),
            detections_discarded_dog_bark: Arc::new(AtomicU64::new(0)),
            classifier_process_time_ms: Arc::new(AtomicU64::new(0)),

            jobs_enqueued: Arc::new(AtomicU64::new(0)),
            jobs_dropped: Arc::new(AtomicU64::new(0)),
            jobs_succeeded: Arc::new(AtomicU64::new(0)),
            jobs_failed: Arc::new(AtomicU64::new(0)),
            jobs_retried: Arc::new(AtomicU64::new(0)),
            jobs_abandoned: Arc::new(AtomicU64::new(0)),

            last_detection_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl PipelineMetrics {
    pub fn record_capture_write(&self) {
        self.capture_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_wraparound(&self) {
        self.capture_wraparounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_misaligned_write(&self) {
        self.capture_misaligned_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment_read(&self, ok: bool) {
        if ok {
            self.capture_segment_reads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.capture_segment_read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn update_capture_write_fps(&self, fps: f64) {
        self.capture_write_fps
            .store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn update_results_fps(&self, fps: f64) {
        self.results_fps.store((fps * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn record_result_processed(&self) {
        self.results_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_pending_detections(&self, n: usize) {
        self.detections_pending.store(n, Ordering::Relaxed);
    }

    pub fn record_detection_confirmed(&self) {
        self.detections_confirmed.fetch_add(1, Ordering::Relaxed);
        *self.last_detection_time.write() = Some(Instant::now());
    }

    pub fn record_detection_discarded(&self, reason: DiscardReason) {
        let counter = match reason {
            DiscardReason::FalsePositive => &self.detections_discarded_false_positive,
            DiscardReason::PrivacyFilter => &self.detections_discarded_privacy,
            DiscardReason::DogBark => &self.detections_discarded_dog_bark,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_classifier_process_time_ms(&self, ms: u64) {
        self.classifier_process_time_ms.store(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            capture_writes: self.capture_writes.load(Ordering::Relaxed),
            capture_wraparounds: self.capture_wraparounds.load(Ordering::Relaxed),
            capture_misaligned_writes: self.capture_misaligned_writes.load(Ordering::Relaxed),
            capture_write_fps: self.capture_write_fps.load(Ordering::Relaxed),
            results_fps: self.results_fps.load(Ordering::Relaxed),
            results_processed: self.results_processed.load(Ordering::Relaxed),
            detections_pending: self.detections_pending.load(Ordering::Relaxed),
            detections_confirmed: self.detections_confirmed.load(Ordering::Relaxed),
            detections_discarded_false_positive: self
                .detections_discarded_false_positive
                .load(Ordering::Relaxed),
            detections_discarded_privacy: self.detections_discarded_privacy.load(Ordering::Relaxed),
            detections_discarded_dog_bark: self
                .detections_discarded_dog_bark
                .load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_abandoned: self.jobs_abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters, for status logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    pub capture_writes: u64,
    pub capture_wraparounds: u64,
    pub capture_misaligned_writes: u64,
    /// Writes per second * 10.
    pub capture_write_fps: u64,
    /// Classifier results per second * 10.
    pub results_fps: u64,
    pub results_processed: u64,
    pub detections_pending: usize,
    pub detections_confirmed: u64,
    pub detections_discarded_false_positive: u64,
    pub detections_discarded_privacy: u64,
    pub detections_discarded_dog_bark: u64,
    pub jobs_enqueued: u64,
    pub jobs_dropped: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_abandoned: u64,
}

/// Counts events and yields a per-second rate once a second has elapsed.
///
/// Owned by whichever loop produces the events (capture writes, classifier
/// results); the computed rate is published through the shared gauges.
#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    frame_count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.frame_count = 0;
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}
