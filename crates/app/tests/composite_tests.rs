//! Composite action contract: strict ordering, abort on first error,
//! timeout, panic isolation, empty success.

mod common;

use common::doubles::{
    FailingStore, PanickingStore, SlowBroadcaster, SlowStore, Timeline,
};
use common::{action_context, permissive_tracker, sample_detection};

use aviary_app::actions::{Action, BroadcastAction, CompositeAction, PersistAction};
use aviary_app::error::ActionError;
use aviary_app::jobqueue::RetryConfig;
use std::sync::Arc;
use std::time::Duration;

fn persist_broadcast_composite(timeline: &Timeline) -> CompositeAction {
    let tracker = permissive_tracker();
    let persist = Action::Persist(PersistAction {
        store: Arc::new(SlowStore {
            timeline: timeline.clone(),
            delay: Duration::from_millis(300),
        }),
        event_tracker: tracker.clone(),
    });
    let broadcast = Action::Broadcast(BroadcastAction {
        broadcaster: Arc::new(SlowBroadcaster {
            timeline: timeline.clone(),
            delay: Duration::from_millis(50),
        }),
        event_tracker: tracker,
        retry: RetryConfig::disabled(),
    });
    CompositeAction::new(vec![persist, broadcast])
}

#[tokio::test]
async fn sub_actions_run_strictly_in_order() {
    let timeline = Timeline::new();
    let composite = persist_broadcast_composite(&timeline);

    let started = std::time::Instant::now();
    composite
        .execute(&action_context(), &sample_detection())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Persist completes before broadcast starts; total is roughly the sum.
    let persist_end = timeline.instant_of("persist-end").unwrap();
    let broadcast_start = timeline.instant_of("broadcast-start").unwrap();
    assert!(broadcast_start > persist_end);
    assert!(elapsed >= Duration::from_millis(350));
    assert_eq!(
        timeline.labels(),
        vec!["persist-start", "persist-end", "broadcast-start", "broadcast-end"]
    );
}

#[tokio::test]
async fn first_error_stops_the_remainder() {
    let timeline = Timeline::new();
    let tracker = permissive_tracker();
    let failing = Action::Persist(PersistAction {
        store: Arc::new(FailingStore),
        event_tracker: tracker.clone(),
    });
    let broadcast = Action::Broadcast(BroadcastAction {
        broadcaster: Arc::new(SlowBroadcaster {
            timeline: timeline.clone(),
            delay: Duration::from_millis(10),
        }),
        event_tracker: tracker,
        retry: RetryConfig::disabled(),
    });
    let composite = CompositeAction::new(vec![failing, broadcast]);

    let err = composite
        .execute(&action_context(), &sample_detection())
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Storage { .. }));
    // The broadcast never started.
    assert!(timeline.labels().is_empty());
}

#[tokio::test]
async fn panicking_sub_action_is_contained() {
    let timeline = Timeline::new();
    let tracker = permissive_tracker();
    let panicking = Action::Persist(PersistAction {
        store: Arc::new(PanickingStore),
        event_tracker: tracker.clone(),
    });
    let broadcast = Action::Broadcast(BroadcastAction {
        broadcaster: Arc::new(SlowBroadcaster {
            timeline: timeline.clone(),
            delay: Duration::from_millis(10),
        }),
        event_tracker: tracker,
        retry: RetryConfig::disabled(),
    });
    let composite = CompositeAction::new(vec![panicking, broadcast]);

    let err = composite
        .execute(&action_context(), &sample_detection())
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Panicked { .. }));
    assert!(timeline.labels().is_empty());
}

#[tokio::test]
async fn overall_timeout_aborts_remaining_actions() {
    let timeline = Timeline::new();
    let composite =
        persist_broadcast_composite(&timeline).with_timeout(Duration::from_millis(100));

    let err = composite
        .execute(&action_context(), &sample_detection())
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Timeout { .. }));
    // Persist started (then overran the composite); broadcast never did.
    assert!(timeline.instant_of("broadcast-start").is_none());
}

#[tokio::test]
async fn per_action_budget_applies_to_each_sub_action() {
    let timeline = Timeline::new();
    let composite =
        persist_broadcast_composite(&timeline).with_per_action_budget(Duration::from_millis(100));

    let err = composite
        .execute(&action_context(), &sample_detection())
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Timeout { .. }));
}

#[tokio::test]
async fn empty_composite_succeeds_immediately() {
    let composite = CompositeAction::new(vec![]);
    composite
        .execute(&action_context(), &sample_detection())
        .await
        .unwrap();
}

#[tokio::test]
async fn nested_composites_preserve_order() {
    let timeline = Timeline::new();
    let inner = persist_broadcast_composite(&timeline);
    let outer = CompositeAction::new(vec![Action::Composite(inner)]);
    outer
        .execute(&action_context(), &sample_detection())
        .await
        .unwrap();
    assert_eq!(timeline.labels().len(), 4);
}
