//! Station configuration.
//!
//! Everything is `#[serde(default)]` so a partial config file works; species
//! overrides are normalized (and their keys lowercased) at load time.

pub mod species;

pub use species::{ActionKind, ActionSpec, SpeciesConfig};

use aviary_foundation::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Station identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    /// Node name recorded on every note.
    pub name: String,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            name: "aviary".to_string(),
        }
    }
}

/// Classifier-facing settings shared by the whole station.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Global confidence floor.
    pub threshold: f64,
    pub sensitivity: f64,
    /// Analysis window overlap in seconds, [0, 2.9].
    pub overlap: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub sample_rate: u32,
    pub bytes_per_sample: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            sensitivity: 1.0,
            overlap: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            sample_rate: 48_000,
            bytes_per_sample: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    /// Side-channel detections above this confidence arm the filter.
    pub confidence: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DogBarkFilterConfig {
    pub enabled: bool,
    pub confidence: f32,
    /// How long a bark keeps suppressing matches, in seconds.
    pub remember: u64,
    /// Species whose detections a recent bark invalidates.
    pub species: Vec<String>,
}

impl Default for DogBarkFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence: 0.1,
            remember: 60,
            species: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicThresholdConfig {
    pub enabled: bool,
    /// Confidence that counts as a high-confidence sighting.
    pub trigger: f32,
    /// Level bumps lapse after this many hours without renewal.
    pub valid_hours: u64,
}

impl Default for DynamicThresholdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger: 0.90,
            valid_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesTrackingConfig {
    pub enabled: bool,
    /// A species counts as new when unseen for this many days.
    pub new_species_window_days: i64,
    pub sync_interval_minutes: u64,
}

impl Default for SpeciesTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            new_species_window_days: 14,
            sync_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
}

/// Retry policy knobs for a retry-enabled downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay_secs: 5,
            max_delay_secs: 300,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    pub enabled: bool,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub enabled: bool,
    pub topic: String,
    pub retry: RetrySettings,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            topic: "aviary/detections".to_string(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Global default for per-(species, event-kind) spacing, in seconds.
    pub interval: u64,
    /// Debounce window merging repeated hits of one species, in seconds.
    pub debounce_seconds: u64,
    pub privacy_filter: FilterConfig,
    pub dog_bark_filter: DogBarkFilterConfig,
    pub dynamic_threshold: DynamicThresholdConfig,
    pub species_tracking: SpeciesTrackingConfig,
    /// Per-species overrides keyed by lowercased common name.
    pub species: HashMap<String, SpeciesConfig>,
    pub log: ToggleConfig,
    pub store: ToggleConfig,
    pub submit: SubmitConfig,
    pub publish: PublishConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            interval: 15,
            debounce_seconds: 15,
            privacy_filter: FilterConfig::default(),
            dog_bark_filter: DogBarkFilterConfig::default(),
            dynamic_threshold: DynamicThresholdConfig::default(),
            species_tracking: SpeciesTrackingConfig::default(),
            species: HashMap::new(),
            log: ToggleConfig { enabled: true },
            store: ToggleConfig { enabled: true },
            submit: SubmitConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQueueConfig {
    pub capacity: usize,
    pub workers: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusSettings {
    pub enabled: bool,
    pub buffer_size: usize,
    pub workers: usize,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 10_000,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Ring buffer depth per source, in seconds.
    pub buffer_seconds: u32,
    pub sources: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 60,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub main: MainConfig,
    pub analyzer: AnalyzerConfig,
    pub realtime: RealtimeConfig,
    pub jobqueue: JobQueueConfig,
    pub eventbus: EventBusSettings,
    pub capture: CaptureConfig,
}

impl Settings {
    /// Load settings from a TOML file, lowercasing species keys and
    /// normalizing species overrides.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut settings: Settings = toml::from_str(&text)
            .map_err(|e| AppError::Config(format!("cannot parse {}: {e}", path.display())))?;
        settings.canonicalize_species();
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("cannot serialize settings: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| AppError::Config(format!("cannot write {}: {e}", path.display())))
    }

    /// Lowercase species keys and coerce out-of-range override values.
    pub fn canonicalize_species(&mut self) {
        let species = std::mem::take(&mut self.realtime.species);
        self.realtime.species = species
            .into_iter()
            .map(|(name, mut config)| {
                config.normalize();
                (name.to_lowercase(), config)
            })
            .collect();
    }

    /// Effective confidence floor for a species, lowercased lookup.
    pub fn base_threshold(&self, species_lower: &str) -> f64 {
        self.realtime
            .species
            .get(species_lower)
            .map(|c| c.threshold)
            .unwrap_or(self.analyzer.threshold)
    }
}
