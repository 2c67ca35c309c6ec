use crate::types::ErrorEvent;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DeduplicationConfig {
    pub enabled: bool,
    /// Repeats of the same error within this window are suppressed.
    pub window: Duration,
    /// Cache entries beyond this count trigger a prune of expired hashes.
    pub max_entries: usize,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(60),
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeduplicationStats {
    pub total_seen: u64,
    pub total_suppressed: u64,
    pub cache_size: usize,
}

/// Suppresses repeated error events by content hash within a sliding window.
pub(crate) struct ErrorDeduplicator {
    config: DeduplicationConfig,
    state: Mutex<DedupState>,
}

struct DedupState {
    last_seen: HashMap<u64, Instant>,
    total_seen: u64,
    total_suppressed: u64,
}

impl ErrorDeduplicator {
    pub(crate) fn new(config: DeduplicationConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DedupState {
                last_seen: HashMap::new(),
                total_seen: 0,
                total_suppressed: 0,
            }),
        }
    }

    /// Returns false when the event is a repeat inside the window.
    pub(crate) fn should_process(&self, event: &ErrorEvent) -> bool {
        let mut hasher = DefaultHasher::new();
        let (component, category, message) = event.content_key();
        component.hash(&mut hasher);
        category.hash(&mut hasher);
        message.hash(&mut hasher);
        let key = hasher.finish();

        let now = Instant::now();
        let mut state = self.state.lock();
        state.total_seen += 1;

        if let Some(last) = state.last_seen.get(&key) {
            if now.duration_since(*last) < self.config.window {
                state.total_suppressed += 1;
                return false;
            }
        }
        state.last_seen.insert(key, now);

        if state.last_seen.len() > self.config.max_entries {
            let window = self.config.window;
            state
                .last_seen
                .retain(|_, seen| now.duration_since(*seen) < window);
        }
        true
    }

    pub(crate) fn stats(&self) -> DeduplicationStats {
        let state = self.state.lock();
        DeduplicationStats {
            total_seen: state.total_seen,
            total_suppressed: state.total_suppressed,
            cache_size: state.last_seen.len(),
        }
    }
}
