use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// One (species, confidence) pair out of the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Raw label string, typically `"Scientific name_Common Name"`.
    pub species: String,
    pub confidence: f32,
}

/// One classifier invocation over a 3 s analysis window.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// Capture source the window came from: sound card name or RTSP URL.
    pub source: String,
    /// Wall-clock start of the analysis window.
    pub start_time: SystemTime,
    /// How long inference took.
    pub elapsed: Duration,
    /// The raw PCM covering the window.
    pub pcm: Vec<u8>,
    pub predictions: Vec<Prediction>,
}

/// Immutable confirmed-detection record, produced by the aggregator at
/// flush time and consumed by actions. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub source_node: String,
    /// ISO 8601 date, local formatting is the station's concern.
    pub date: String,
    /// 24-hour clock time.
    pub time: String,
    pub source: String,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub species_code: String,
    pub scientific_name: String,
    pub common_name: String,
    /// Rounded to two decimal places at creation.
    pub confidence: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub threshold: f64,
    pub sensitivity: f64,
    pub clip_name: String,
    pub processing_time_ms: u64,
}

/// A detection travelling through the action pipeline: the note plus the
/// audio evidence and the full classifier result set behind it.
#[derive(Debug, Clone)]
pub struct Detection {
    /// 3 s PCM segment containing the vocalization.
    pub pcm: Vec<u8>,
    pub note: Note,
    pub predictions: Vec<Prediction>,
}
