//! Detection-processing core: taxonomy resolution, per-species rate
//! limiting, first-seen tracking, dynamic thresholds, and the aggregator
//! that debounces raw classifier hits into confirmed detections.

pub mod dynamic_threshold;
pub mod event_tracker;
pub mod processor;
pub mod species_tracker;
pub mod taxonomy;

pub use dynamic_threshold::DynamicThreshold;
pub use event_tracker::{EventKind, EventTracker};
pub use processor::{DetectionProcessor, IncludeFilter, PendingDetection};
pub use species_tracker::SpeciesStateTracker;
pub use taxonomy::{LabelTaxonomy, Taxon, TaxonomyResolver};
