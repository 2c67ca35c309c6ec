//! Contracts consumed by the core. The classifier, the persistent store,
//! upload targets, brokers and broadcasters all live behind these traits;
//! the pipeline never sees a concrete client.
//!
//! Retries for these collaborators are owned by the job queue. Implementors
//! must not retry internally.

pub mod memory_store;

pub use memory_store::MemoryDatastore;

use crate::error::ActionError;
use crate::notes::Note;
use async_trait::async_trait;
use std::time::SystemTime;

/// Persistent store for confirmed detections.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Persist one note. Must be durable on return: the live-stream
    /// broadcast that follows reads the saved row.
    async fn save(&self, note: &Note) -> Result<(), ActionError>;

    /// Free-text search over saved notes (species names).
    async fn search(&self, query: &str) -> Result<Vec<Note>, ActionError>;

    /// First-seen date per scientific name, for the species state tracker.
    async fn init_species_history(&self) -> Result<Vec<(String, SystemTime)>, ActionError>;
}

/// Third-party submission target: soundscape upload plus detection post.
#[async_trait]
pub trait SoundscapeUploader: Send + Sync {
    async fn upload_soundscape(
        &self,
        timestamp: &str,
        pcm: &[u8],
    ) -> Result<String, ActionError>;

    async fn post_detection(
        &self,
        soundscape_id: &str,
        timestamp: &str,
        common_name: &str,
        scientific_name: &str,
        confidence: f64,
    ) -> Result<(), ActionError>;
}

/// Message broker for structured detection events.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), ActionError>;
}

/// Live event stream (SSE-style) push target.
#[async_trait]
pub trait LiveBroadcaster: Send + Sync {
    async fn broadcast(&self, note: &Note) -> Result<(), ActionError>;
}
