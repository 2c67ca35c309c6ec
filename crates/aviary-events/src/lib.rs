//! In-process asynchronous event bus.
//!
//! Three typed channel families (error, resource, detection) feed a small
//! pool of worker threads that fan events out to registered consumers.
//! Publishing never blocks: a full channel drops the event and bumps a
//! counter, and a lock-free flag short-circuits publishing entirely while no
//! consumer is registered.

pub mod bus;
pub mod dedup;
pub mod types;

pub use bus::{EventBus, EventBusConfig, EventBusStats};
pub use dedup::DeduplicationConfig;
pub use types::{DetectionEvent, ErrorEvent, EventConsumer, ResourceEvent, ResourceSeverity};
