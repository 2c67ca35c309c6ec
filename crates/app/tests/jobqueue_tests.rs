//! Job queue behavior: capacity bound, retry policy, non-retryable
//! abandonment, graceful shutdown.

mod common;

use common::doubles::{FailingStore, FlakyBroadcaster, GatedStore};
use common::{permissive_tracker, sample_detection, wait_until};

use aviary_app::actions::{Action, BroadcastAction, CommandAction, PersistAction};
use aviary_app::jobqueue::{JobQueue, QueueError, RetryConfig, Task};
use aviary_foundation::real_clock;
use aviary_telemetry::PipelineMetrics;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn queue(capacity: usize, workers: usize) -> (Arc<JobQueue>, Arc<PipelineMetrics>) {
    let metrics = Arc::new(PipelineMetrics::default());
    let queue = JobQueue::new(capacity, workers, metrics.clone(), real_clock());
    queue.start();
    (queue, metrics)
}

fn persist_task(store: Arc<dyn aviary_app::external::Datastore>) -> Task {
    Task {
        action: Action::Persist(PersistAction {
            store,
            event_tracker: permissive_tracker(),
        }),
        detection: sample_detection(),
    }
}

#[tokio::test]
async fn full_queue_rejects_the_newest_enqueue() {
    let (queue, _metrics) = queue(2, 1);
    let store = Arc::new(GatedStore::new());

    // Occupy the single worker.
    queue.enqueue(persist_task(store.clone())).unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || {
            store.started.load(Ordering::SeqCst) == 1
        })
        .await
    );

    // Queue capacity is 2: two more fit, the third bounces.
    queue.enqueue(persist_task(store.clone())).unwrap();
    queue.enqueue(persist_task(store.clone())).unwrap();
    let err = queue.enqueue(persist_task(store.clone())).unwrap_err();
    assert_eq!(err, QueueError::QueueFull);
    assert_eq!(queue.stats().dropped, 1);

    store.release.notify_waiters();
    // Let the rest drain.
    for _ in 0..8 {
        store.release.notify_waiters();
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let _ = queue.stop_with_timeout(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn retryable_failure_is_rescheduled_until_success() {
    let (queue, metrics) = queue(16, 2);
    let broadcaster = Arc::new(FlakyBroadcaster::failing(2));
    let task = Task {
        action: Action::Broadcast(BroadcastAction {
            broadcaster: broadcaster.clone(),
            event_tracker: permissive_tracker(),
            retry: RetryConfig {
                enabled: true,
                max_retries: 3,
                initial_delay: Duration::from_millis(30),
                max_delay: Duration::from_millis(120),
                multiplier: 2.0,
            },
        }),
        detection: sample_detection(),
    };
    queue.enqueue(task).unwrap();

    assert!(
        wait_until(Duration::from_secs(3), || {
            metrics.jobs_succeeded.load(Ordering::Relaxed) == 1
        })
        .await
    );
    assert_eq!(broadcaster.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(queue.stats().retried, 2);
    assert_eq!(queue.stats().failed, 0);
    queue.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn retries_exhaust_into_terminal_failure() {
    let (queue, _metrics) = queue(16, 1);
    let broadcaster = Arc::new(FlakyBroadcaster::failing(10));
    let task = Task {
        action: Action::Broadcast(BroadcastAction {
            broadcaster: broadcaster.clone(),
            event_tracker: permissive_tracker(),
            retry: RetryConfig {
                enabled: true,
                max_retries: 2,
                initial_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(40),
                multiplier: 2.0,
            },
        }),
        detection: sample_detection(),
    };
    queue.enqueue(task).unwrap();

    assert!(
        wait_until(Duration::from_secs(3), || queue.stats().failed == 1).await
    );
    // Initial attempt plus two retries.
    assert_eq!(broadcaster.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(queue.stats().retried, 2);
    queue.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn retryable_error_without_policy_fails_once() {
    let (queue, _metrics) = queue(16, 1);
    // Storage errors are retryable by kind, but persist actions carry a
    // disabled retry policy: one attempt only.
    queue.enqueue(persist_task(Arc::new(FailingStore))).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || queue.stats().abandoned == 1).await
    );
    assert_eq!(queue.stats().retried, 0);
    queue.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn validation_failure_is_never_retried() {
    let (queue, _metrics) = queue(16, 1);
    // Relative path fails validation inside the command action.
    let task = Task {
        action: Action::Command(CommandAction {
            command: "relative/script.sh".into(),
            parameters: vec![],
        }),
        detection: sample_detection(),
    };
    queue.enqueue(task).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || queue.stats().abandoned == 1).await
    );
    assert_eq!(queue.stats().retried, 0);
    queue.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn shutdown_rejects_new_tasks_and_abandons_queued_ones() {
    let (queue, _metrics) = queue(8, 1);
    let store = Arc::new(GatedStore::new());

    queue.enqueue(persist_task(store.clone())).unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || {
            store.started.load(Ordering::SeqCst) == 1
        })
        .await
    );
    // These stay queued behind the blocked worker.
    queue.enqueue(persist_task(store.clone())).unwrap();
    queue.enqueue(persist_task(store.clone())).unwrap();

    // The in-flight save never finishes, so shutdown times out, and the
    // queued jobs are abandoned.
    let result = queue.stop_with_timeout(Duration::from_millis(200)).await;
    assert!(result.is_err());
    assert_eq!(queue.stats().abandoned, 2);

    let err = queue.enqueue(persist_task(store)).unwrap_err();
    assert_eq!(err, QueueError::ShuttingDown);
}

#[tokio::test]
async fn stats_count_successes() {
    let (queue, _metrics) = queue(8, 2);
    let store = Arc::new(aviary_app::external::MemoryDatastore::new());
    for _ in 0..3 {
        queue
            .enqueue(persist_task(store.clone()))
            .unwrap();
    }
    assert!(
        wait_until(Duration::from_secs(2), || queue.stats().succeeded == 3).await
    );
    assert_eq!(queue.stats().enqueued, 3);
    assert_eq!(store.len(), 3);
    queue.stop_with_timeout(Duration::from_secs(2)).await.unwrap();
}
