//! Realtime bird-audio detection pipeline.
//!
//! Continuous PCM comes in from capture sources, a classifier scores 3 s
//! windows, and this crate turns the noisy stream of overlapping hits into
//! confirmed detections with downstream side effects: aggregation with
//! debounce, per-species rate limiting, action planning, a bounded worker
//! pool with retry policy, and ordered composites for dependent actions.

pub mod actions;
pub mod config;
pub mod detect;
pub mod error;
pub mod external;
pub mod jobqueue;
pub mod notes;
pub mod privacy;
pub mod runtime;

pub use config::Settings;
pub use error::ActionError;
pub use notes::{ClassifierOutput, Detection, Note, Prediction};
pub use runtime::{Pipeline, PipelineDeps};
