use crate::config::SpeciesConfig;
use aviary_foundation::SharedClock;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// Downstream side-effect category, one rate-limit map per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Persist,
    Log,
    Notify,
    Submit,
    Publish,
    Broadcast,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Persist,
        EventKind::Log,
        EventKind::Notify,
        EventKind::Submit,
        EventKind::Publish,
        EventKind::Broadcast,
    ];
}

/// Per-kind state: last accepted event per lowercased species.
struct EventHandler {
    last_event: Mutex<HashMap<String, Instant>>,
}

impl EventHandler {
    fn new() -> Self {
        Self {
            last_event: Mutex::new(HashMap::new()),
        }
    }

    /// Accept and record iff no prior event exists or the interval elapsed.
    fn should_handle(&self, species_lower: &str, interval: Duration, now: Instant) -> bool {
        let mut last_event = self.last_event.lock();
        match last_event.get(species_lower) {
            Some(last) if now.duration_since(*last) < interval => false,
            _ => {
                last_event.insert(species_lower.to_string(), now);
                true
            }
        }
    }

    fn reset(&self, species_lower: &str) {
        self.last_event.lock().remove(species_lower);
    }
}

struct TrackerShared {
    handlers: HashMap<EventKind, std::sync::Arc<EventHandler>>,
    species_configs: HashMap<String, SpeciesConfig>,
    default_interval: Duration,
}

/// Per-(species, event-kind) minimum-interval gate.
///
/// Lock ordering is strict: the outer read lock over the handler and
/// species-config maps is released before any handler's inner lock is
/// taken, so two threads tracking different kinds never deadlock.
pub struct EventTracker {
    shared: RwLock<TrackerShared>,
    clock: SharedClock,
}

impl EventTracker {
    pub fn new(default_interval: Duration, clock: SharedClock) -> Self {
        Self::with_config(default_interval, HashMap::new(), clock)
    }

    pub fn with_config(
        default_interval: Duration,
        species_configs: HashMap<String, SpeciesConfig>,
        clock: SharedClock,
    ) -> Self {
        let species_configs = species_configs
            .into_iter()
            .map(|(name, config)| (name.to_lowercase(), config))
            .collect();
        let handlers = EventKind::ALL
            .iter()
            .map(|kind| (*kind, std::sync::Arc::new(EventHandler::new())))
            .collect();
        Self {
            shared: RwLock::new(TrackerShared {
                handlers,
                species_configs,
                default_interval,
            }),
            clock,
        }
    }

    /// Returns true, and records the event, iff the species has not fired
    /// this event kind within its effective interval.
    pub fn track(&self, species: &str, kind: EventKind) -> bool {
        let species_lower = species.to_lowercase();

        // Outer lock: resolve handler and effective interval, then release
        // before touching the handler.
        let (handler, interval) = {
            let shared = self.shared.read();
            let Some(handler) = shared.handlers.get(&kind) else {
                return false;
            };

            let mut interval = shared.default_interval;
            if let Some(config) = shared.species_configs.get(&species_lower) {
                if config.interval > 0 {
                    interval = Duration::from_secs(config.interval as u64);
                } else if config.interval < 0 {
                    warn!(
                        species,
                        interval = config.interval,
                        "negative interval configured for species, using default"
                    );
                }
                // Zero inherits the default.
            }
            (handler.clone(), interval)
        };

        handler.should_handle(&species_lower, interval, self.clock.now())
    }

    /// Clear the recorded state for one species and kind.
    pub fn reset(&self, species: &str, kind: EventKind) {
        let species_lower = species.to_lowercase();
        let handler = {
            let shared = self.shared.read();
            shared.handlers.get(&kind).cloned()
        };
        if let Some(handler) = handler {
            handler.reset(&species_lower);
        }
    }

    /// Swap in a new species-config map (config reload).
    pub fn update_species_configs(&self, species_configs: HashMap<String, SpeciesConfig>) {
        let species_configs = species_configs
            .into_iter()
            .map(|(name, config)| (name.to_lowercase(), config))
            .collect();
        self.shared.write().species_configs = species_configs;
    }
}
