//! Shared builders for the integration tests.

pub mod doubles;

use aviary_app::actions::{ActionDeps, ActionPlanner, RangeFilterState};
use aviary_app::config::Settings;
use aviary_app::detect::{DetectionProcessor, EventTracker, LabelTaxonomy};
use aviary_app::external::MemoryDatastore;
use aviary_app::jobqueue::JobQueue;
use aviary_app::notes::{ClassifierOutput, Prediction};
use aviary_foundation::{test_clock, SharedClock, TestClock};
use aviary_telemetry::PipelineMetrics;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub struct Harness {
    pub processor: Arc<DetectionProcessor>,
    pub queue: Arc<JobQueue>,
    pub metrics: Arc<PipelineMetrics>,
    pub store: Arc<MemoryDatastore>,
    pub clock: Arc<TestClock>,
    pub settings: Arc<Settings>,
}

/// Settings tuned for fast deterministic tests: log + store actions only,
/// permissive global threshold.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.analyzer.threshold = 0.5;
    settings.realtime.interval = 0;
    settings.realtime.log.enabled = true;
    settings.realtime.store.enabled = true;
    settings.realtime.submit.enabled = false;
    settings.realtime.publish.enabled = false;
    settings.realtime.species_tracking.enabled = false;
    settings.jobqueue.capacity = 32;
    settings.jobqueue.workers = 2;
    settings
}

/// Build a detection processor over a fresh in-memory store and virtual
/// clock. The job queue is started; actions run for real.
pub fn build_harness(settings: Settings) -> Harness {
    let mut settings = settings;
    settings.canonicalize_species();
    let settings = Arc::new(settings);
    let clock = test_clock();
    let shared_clock: SharedClock = clock.clone();
    let metrics = Arc::new(PipelineMetrics::default());
    let store = Arc::new(MemoryDatastore::new());

    let event_tracker = Arc::new(EventTracker::with_config(
        Duration::from_secs(settings.realtime.interval),
        settings.realtime.species.clone(),
        shared_clock.clone(),
    ));

    let queue = JobQueue::new(
        settings.jobqueue.capacity,
        settings.jobqueue.workers,
        metrics.clone(),
        shared_clock.clone(),
    );
    queue.start();

    let planner = ActionPlanner::new(
        settings.clone(),
        ActionDeps {
            store: store.clone(),
            uploader: None,
            broker: None,
            broadcaster: None,
            event_tracker,
            range_filter: Arc::new(RangeFilterState::new()),
        },
        shared_clock.clone(),
    );

    let processor = Arc::new(DetectionProcessor::new(
        settings.clone(),
        shared_clock,
        Arc::new(LabelTaxonomy::new()),
        None,
        planner,
        queue.clone(),
        metrics.clone(),
        None,
        None,
    ));

    Harness {
        processor,
        queue,
        metrics,
        store,
        clock,
        settings,
    }
}

/// One classifier output with a single prediction.
pub fn single_result(
    source: &str,
    start_time: SystemTime,
    label: &str,
    confidence: f32,
) -> ClassifierOutput {
    ClassifierOutput {
        source: source.to_string(),
        start_time,
        elapsed: Duration::from_millis(420),
        pcm: vec![0u8; 16],
        predictions: vec![Prediction {
            species: label.to_string(),
            confidence,
        }],
    }
}

/// A detection ready to feed into actions directly.
pub fn sample_detection() -> aviary_app::notes::Detection {
    use aviary_app::notes::{Detection, Note};
    use chrono::Utc;
    Detection {
        pcm: vec![0u8; 16],
        note: Note {
            source_node: "station-1".into(),
            date: "2025-06-14".into(),
            time: "05:42:10".into(),
            source: "hw:0".into(),
            begin_time: Utc::now(),
            end_time: Utc::now(),
            species_code: "amerob".into(),
            scientific_name: "Turdus migratorius".into(),
            common_name: "American Robin".into(),
            confidence: 0.9,
            latitude: 60.17,
            longitude: 24.94,
            threshold: 0.8,
            sensitivity: 1.0,
            clip_name: "2025/06/turdus_migratorius_90p_20250614T054210Z.wav".into(),
            processing_time_ms: 420,
        },
        predictions: vec![],
    }
}

/// Context for direct action invocation.
pub fn action_context() -> aviary_app::actions::ActionContext {
    aviary_app::actions::ActionContext {
        clock: aviary_foundation::real_clock(),
    }
}

/// Event tracker that never suppresses (zero interval).
pub fn permissive_tracker() -> Arc<EventTracker> {
    Arc::new(EventTracker::new(
        Duration::ZERO,
        aviary_foundation::real_clock(),
    ))
}

/// Poll until `check` passes or the deadline lapses.
pub async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
