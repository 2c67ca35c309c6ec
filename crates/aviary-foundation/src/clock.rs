//! Clock abstraction so debounce windows, rate-limit intervals and flush
//! deadlines can be driven by virtual time in tests.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Time source used by every component that compares timestamps.
///
/// `now` is monotonic and used for interval arithmetic; `system_now` is the
/// wall clock used wherever a timestamp crosses a process boundary (notes,
/// capture buffer indexing).
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn system_now(&self) -> SystemTime;

    fn sleep(&self, duration: Duration);
}

/// Production clock backed by the OS.
#[derive(Default)]
pub struct RealClock;

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for deterministic tests. `advance` moves the monotonic and
/// wall clocks together so both views stay consistent.
pub struct TestClock {
    inner: parking_lot::Mutex<(Instant, SystemTime)>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::Mutex::new((Instant::now(), SystemTime::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut guard = self.inner.lock();
        guard.0 += duration;
        guard.1 += duration;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.inner.lock().0
    }

    fn system_now(&self) -> SystemTime {
        self.inner.lock().1
    }

    fn sleep(&self, duration: Duration) {
        // Virtual time: sleeping just advances the clock.
        self.advance(duration);
        std::thread::yield_now();
    }
}

/// Shared handle passed into components.
pub type SharedClock = Arc<dyn Clock>;

pub fn real_clock() -> SharedClock {
    Arc::new(RealClock::new())
}

pub fn test_clock() -> Arc<TestClock> {
    Arc::new(TestClock::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_both_views() {
        let clock = TestClock::new();
        let t0 = clock.now();
        let s0 = clock.system_now();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now().duration_since(t0), Duration::from_secs(5));
        assert_eq!(
            clock.system_now().duration_since(s0).unwrap(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_clock_sleep_is_virtual() {
        let clock = TestClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::from_secs(60));
        assert_eq!(clock.now().duration_since(t0), Duration::from_secs(60));
    }
}
