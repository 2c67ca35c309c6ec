use crate::actions::ActionContext;
use crate::detect::event_tracker::{EventKind, EventTracker};
use crate::error::ActionError;
use crate::external::Datastore;
use crate::notes::Detection;
use std::sync::Arc;
use tracing::debug;

/// Writes the note to the datastore. Runs ahead of the broadcast inside a
/// composite so consumers of the live stream find the saved row.
#[derive(Clone)]
pub struct PersistAction {
    pub store: Arc<dyn Datastore>,
    pub event_tracker: Arc<EventTracker>,
}

impl PersistAction {
    pub async fn execute(
        &self,
        _ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        let note = &detection.note;
        if !self.event_tracker.track(&note.common_name, EventKind::Persist) {
            debug!(species = %note.common_name, "persist suppressed by event tracker");
            return Ok(());
        }
        self.store.save(note).await?;
        debug!(species = %note.common_name, clip = %note.clip_name, "note persisted");
        Ok(())
    }
}
