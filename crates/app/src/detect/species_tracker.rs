use crate::external::Datastore;
use aviary_foundation::SharedClock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Store reads are attempted at most this often.
const SYNC_MIN_INTERVAL: Duration = Duration::from_secs(60);

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Tracks the first-seen date of every species so confirmed detections can
/// be flagged as "new species".
///
/// State is populated lazily from the store and kept current by `update`
/// calls at confirmed-detection time. Losing the store is never fatal; the
/// tracker just starts from empty and re-learns.
pub struct SpeciesStateTracker {
    store: Arc<dyn Datastore>,
    first_seen: Mutex<HashMap<String, SystemTime>>,
    last_sync_attempt: Mutex<Option<Instant>>,
    window_days: i64,
    clock: SharedClock,
}

impl SpeciesStateTracker {
    pub fn new(store: Arc<dyn Datastore>, window_days: i64, clock: SharedClock) -> Self {
        Self {
            store,
            first_seen: Mutex::new(HashMap::new()),
            last_sync_attempt: Mutex::new(None),
            window_days,
            clock,
        }
    }

    /// Seed state from the store. Failures are logged and ignored.
    pub async fn init_from_store(&self) {
        match self.store.init_species_history().await {
            Ok(history) => {
                let count = history.len();
                let mut first_seen = self.first_seen.lock();
                for (scientific, seen_at) in history {
                    Self::record_earliest(&mut first_seen, &scientific, seen_at);
                }
                info!(species = count, "species tracker initialized from store");
            }
            Err(err) => {
                warn!(error = %err, "failed to initialize species tracker, continuing empty");
            }
        }
    }

    /// Record a sighting; the earliest time wins.
    pub fn update(&self, scientific_name: &str, seen_at: SystemTime) {
        let mut first_seen = self.first_seen.lock();
        Self::record_earliest(&mut first_seen, scientific_name, seen_at);
    }

    fn record_earliest(
        first_seen: &mut HashMap<String, SystemTime>,
        scientific_name: &str,
        seen_at: SystemTime,
    ) {
        first_seen
            .entry(scientific_name.to_string())
            .and_modify(|existing| {
                if seen_at < *existing {
                    *existing = seen_at;
                }
            })
            .or_insert(seen_at);
    }

    /// A species is new when it has never been recorded, or its first-seen
    /// time lies more than the configured window in the past.
    pub fn is_new(&self, scientific_name: &str) -> bool {
        let now = self.clock.system_now();
        let window = Duration::from_secs(self.window_days.max(0) as u64 * SECS_PER_DAY);
        let first_seen = self.first_seen.lock();
        match first_seen.get(scientific_name) {
            None => true,
            Some(seen_at) => match now.duration_since(*seen_at) {
                Ok(age) => age > window,
                // First seen in the future only happens with skewed clocks;
                // treat as already known.
                Err(_) => false,
            },
        }
    }

    /// Kick off a background store sync if one has not run within the
    /// rate-limit interval. Never blocks the caller.
    pub fn maybe_spawn_sync(self: &Arc<Self>) {
        {
            let mut last_attempt = self.last_sync_attempt.lock();
            let now = Instant::now();
            if let Some(last) = *last_attempt {
                if now.duration_since(last) < SYNC_MIN_INTERVAL {
                    return;
                }
            }
            *last_attempt = Some(now);
        }
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            debug!("species tracker background sync");
            tracker.init_from_store().await;
        });
    }

    pub fn known_species(&self) -> usize {
        self.first_seen.lock().len()
    }
}
