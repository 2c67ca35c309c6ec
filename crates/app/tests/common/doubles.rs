//! Controllable collaborator implementations for exercising actions, the
//! composite and the job queue.

use async_trait::async_trait;
use aviary_app::error::ActionError;
use aviary_app::external::{Datastore, LiveBroadcaster};
use aviary_app::notes::Note;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Shared timeline of named checkpoints, for ordering assertions.
#[derive(Clone, Default)]
pub struct Timeline {
    events: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, label: &str) {
        self.events.lock().push((label.to_string(), Instant::now()));
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn instant_of(&self, label: &str) -> Option<Instant> {
        self.events
            .lock()
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| *t)
    }
}

/// Store that sleeps, marking start and completion on the timeline.
pub struct SlowStore {
    pub timeline: Timeline,
    pub delay: Duration,
}

#[async_trait]
impl Datastore for SlowStore {
    async fn save(&self, _note: &Note) -> Result<(), ActionError> {
        self.timeline.mark("persist-start");
        tokio::time::sleep(self.delay).await;
        self.timeline.mark("persist-end");
        Ok(())
    }

    async fn search(&self, _query: &str) -> Result<Vec<Note>, ActionError> {
        Ok(vec![])
    }

    async fn init_species_history(&self) -> Result<Vec<(String, SystemTime)>, ActionError> {
        Ok(vec![])
    }
}

/// Store that panics on save.
pub struct PanickingStore;

#[async_trait]
impl Datastore for PanickingStore {
    async fn save(&self, _note: &Note) -> Result<(), ActionError> {
        panic!("store bug");
    }

    async fn search(&self, _query: &str) -> Result<Vec<Note>, ActionError> {
        Ok(vec![])
    }

    async fn init_species_history(&self) -> Result<Vec<(String, SystemTime)>, ActionError> {
        Ok(vec![])
    }
}

/// Store that fails every save with a storage error.
pub struct FailingStore;

#[async_trait]
impl Datastore for FailingStore {
    async fn save(&self, _note: &Note) -> Result<(), ActionError> {
        Err(ActionError::Storage {
            component: "datastore",
            operation: "save",
            message: "database locked".into(),
        })
    }

    async fn search(&self, _query: &str) -> Result<Vec<Note>, ActionError> {
        Ok(vec![])
    }

    async fn init_species_history(&self) -> Result<Vec<(String, SystemTime)>, ActionError> {
        Ok(vec![])
    }
}

/// Store whose save blocks until released; counts how many saves started.
pub struct GatedStore {
    pub started: Arc<AtomicU32>,
    pub release: Arc<tokio::sync::Notify>,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            started: Arc::new(AtomicU32::new(0)),
            release: Arc::new(tokio::sync::Notify::new()),
        }
    }
}

impl Default for GatedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for GatedStore {
    async fn save(&self, _note: &Note) -> Result<(), ActionError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(())
    }

    async fn search(&self, _query: &str) -> Result<Vec<Note>, ActionError> {
        Ok(vec![])
    }

    async fn init_species_history(&self) -> Result<Vec<(String, SystemTime)>, ActionError> {
        Ok(vec![])
    }
}

/// Broadcaster that sleeps briefly and records its start on the timeline.
pub struct SlowBroadcaster {
    pub timeline: Timeline,
    pub delay: Duration,
}

#[async_trait]
impl LiveBroadcaster for SlowBroadcaster {
    async fn broadcast(&self, _note: &Note) -> Result<(), ActionError> {
        self.timeline.mark("broadcast-start");
        tokio::time::sleep(self.delay).await;
        self.timeline.mark("broadcast-end");
        Ok(())
    }
}

/// Broadcaster that fails with a network error a set number of times before
/// succeeding, counting attempts.
pub struct FlakyBroadcaster {
    pub failures_remaining: AtomicU32,
    pub attempts: AtomicU32,
}

impl FlakyBroadcaster {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(times),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LiveBroadcaster for FlakyBroadcaster {
    async fn broadcast(&self, _note: &Note) -> Result<(), ActionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ActionError::Network {
                component: "live-stream",
                operation: "broadcast",
                message: "connection reset".into(),
            });
        }
        Ok(())
    }
}
