//! End-to-end pipeline wiring: classifier feed in, persisted notes out,
//! lifecycle transitions, capture buffer provisioning.

mod common;

use common::{single_result, wait_until};

use aviary_app::external::MemoryDatastore;
use aviary_app::{Pipeline, PipelineDeps, Settings};
use aviary_foundation::{test_clock, Clock, PipelineState, SharedClock};
use std::sync::Arc;
use std::time::Duration;

const ROBIN: &str = "Turdus migratorius_American Robin";

fn pipeline_settings() -> Settings {
    let mut settings = Settings::default();
    settings.analyzer.threshold = 0.5;
    settings.analyzer.overlap = 0.0;
    settings.realtime.interval = 0;
    settings.realtime.species_tracking.enabled = true;
    settings.capture.sources = vec!["hw:0".to_string()];
    settings.capture.buffer_seconds = 10;
    settings
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn classifier_results_become_persisted_notes() {
    let clock = test_clock();
    let store = Arc::new(MemoryDatastore::new());
    let mut deps = PipelineDeps::with_store(store.clone());
    let shared: SharedClock = clock.clone();
    deps.clock = Some(shared);

    let pipeline = Pipeline::start(pipeline_settings(), deps).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert!(pipeline.registry.has("hw:0"));

    let sender = pipeline.results_sender();
    let t0 = clock.system_now();
    for i in 0..3u64 {
        sender
            .send(single_result(
                "hw:0",
                t0 + Duration::from_secs(i),
                ROBIN,
                0.7 + i as f32 * 0.05,
            ))
            .unwrap();
    }

    // Give the result loop a moment, then step past the debounce window;
    // the real 1 s flusher tick picks it up.
    assert!(
        wait_until(Duration::from_secs(2), || {
            pipeline.metrics.snapshot().results_processed == 3
        })
        .await
    );
    clock.advance(Duration::from_secs(16));
    assert!(wait_until(Duration::from_secs(3), || store.len() == 1).await);

    let note = store.all().remove(0);
    assert_eq!(note.common_name, "American Robin");
    assert_eq!(note.source, "hw:0");

    let stats = pipeline.job_stats();
    assert!(stats.enqueued >= 1);

    pipeline.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_stops_cleanly_with_nothing_in_flight() {
    let store = Arc::new(MemoryDatastore::new());
    let pipeline = Pipeline::start(pipeline_settings(), PipelineDeps::with_store(store))
        .await
        .unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);
    pipeline.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capture_buffers_serve_time_ranged_reads() {
    let store = Arc::new(MemoryDatastore::new());
    let pipeline = Pipeline::start(pipeline_settings(), PipelineDeps::with_store(store))
        .await
        .unwrap();

    let registry = pipeline.registry.clone();
    // 48kHz * 2 bytes = 96000 bytes/s; write one second's worth.
    registry.write_to("hw:0", &vec![7u8; 96_000]).unwrap();

    // Ask for the second starting now: the read blocks until the window
    // has elapsed on the wall clock, then returns the covering bytes.
    let start = std::time::SystemTime::now();
    let cancel = std::sync::atomic::AtomicBool::new(false);
    let segment = tokio::task::spawn_blocking(move || {
        registry.read_segment_from("hw:0", start, Duration::from_secs(1), &cancel)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(segment.len(), 96_000);

    pipeline.shutdown(Duration::from_secs(5)).await.unwrap();
}
