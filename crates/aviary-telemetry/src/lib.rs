//! Lock-free metrics shared across pipeline threads.
//!
//! Every field is an atomic so hot paths (capture writes, aggregator ticks,
//! worker loops) never contend on a lock to record a count.

pub mod pipeline_metrics;

pub use pipeline_metrics::{DiscardReason, FpsTracker, PipelineMetrics, PipelineMetricsSnapshot};
