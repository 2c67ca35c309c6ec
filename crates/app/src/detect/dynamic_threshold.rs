use crate::config::DynamicThresholdConfig;
use std::time::{Duration, SystemTime};

/// High-confidence sightings needed to raise the floor one level.
const SIGHTINGS_PER_LEVEL: u32 = 3;

/// Levels above the base floor; each one raises the floor by `LEVEL_STEP`
/// of the base value.
const MAX_LEVEL: u32 = 3;
const LEVEL_STEP: f64 = 0.25;

/// Runtime-adjusted confidence floor for one species.
///
/// Repeated high-confidence sightings push the floor upward in steps, so a
/// species that is currently loud and close does not flood the pipeline
/// with marginal matches. Raised levels lapse after the validity window.
#[derive(Debug, Clone)]
pub struct DynamicThreshold {
    pub level: u32,
    pub base_value: f64,
    pub current_value: f64,
    pub high_conf_count: u32,
    pub valid_hours: u64,
    pub expires_at: SystemTime,
}

impl DynamicThreshold {
    pub fn new(base_value: f64, config: &DynamicThresholdConfig, now: SystemTime) -> Self {
        Self {
            level: 0,
            base_value,
            current_value: base_value,
            high_conf_count: 0,
            valid_hours: config.valid_hours,
            expires_at: now + Duration::from_secs(config.valid_hours * 3600),
        }
    }

    /// Record one sighting. Confidences above the trigger accumulate toward
    /// the next level; every bump renews the validity window.
    pub fn record(&mut self, confidence: f32, config: &DynamicThresholdConfig, now: SystemTime) {
        if confidence <= config.trigger {
            return;
        }
        self.high_conf_count += 1;
        self.expires_at = now + Duration::from_secs(config.valid_hours * 3600);
        if self.high_conf_count >= SIGHTINGS_PER_LEVEL && self.level < MAX_LEVEL {
            self.level += 1;
            self.high_conf_count = 0;
            self.current_value =
                (self.base_value * (1.0 + LEVEL_STEP * f64::from(self.level))).min(1.0);
        }
    }

    /// The effective floor: never below the configured base.
    pub fn effective(&self) -> f64 {
        self.current_value.max(self.base_value)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DynamicThresholdConfig {
        DynamicThresholdConfig {
            enabled: true,
            trigger: 0.90,
            valid_hours: 24,
        }
    }

    #[test]
    fn starts_at_base() {
        let now = SystemTime::now();
        let dt = DynamicThreshold::new(0.6, &config(), now);
        assert_eq!(dt.effective(), 0.6);
        assert_eq!(dt.level, 0);
    }

    #[test]
    fn low_confidence_does_not_accumulate() {
        let now = SystemTime::now();
        let mut dt = DynamicThreshold::new(0.6, &config(), now);
        for _ in 0..10 {
            dt.record(0.7, &config(), now);
        }
        assert_eq!(dt.level, 0);
        assert_eq!(dt.effective(), 0.6);
    }

    #[test]
    fn three_high_confidence_sightings_raise_one_level() {
        let now = SystemTime::now();
        let mut dt = DynamicThreshold::new(0.6, &config(), now);
        dt.record(0.95, &config(), now);
        dt.record(0.95, &config(), now);
        assert_eq!(dt.level, 0);
        dt.record(0.95, &config(), now);
        assert_eq!(dt.level, 1);
        assert!((dt.effective() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn floor_caps_at_one() {
        let now = SystemTime::now();
        let mut dt = DynamicThreshold::new(0.9, &config(), now);
        for _ in 0..20 {
            dt.record(0.99, &config(), now);
        }
        assert_eq!(dt.level, MAX_LEVEL);
        assert!(dt.effective() <= 1.0);
    }

    #[test]
    fn record_renews_validity() {
        let now = SystemTime::now();
        let mut dt = DynamicThreshold::new(0.6, &config(), now);
        let later = now + Duration::from_secs(30 * 3600);
        assert!(dt.is_expired(later));
        dt.record(0.95, &config(), later);
        assert!(!dt.is_expired(later));
    }
}
