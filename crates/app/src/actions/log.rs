use crate::actions::ActionContext;
use crate::detect::event_tracker::{EventKind, EventTracker};
use crate::error::ActionError;
use crate::notes::Detection;
use std::sync::Arc;
use tracing::{debug, info};

/// Writes one structured log line per detection, rate limited per species.
#[derive(Clone)]
pub struct LogAction {
    pub event_tracker: Arc<EventTracker>,
}

impl LogAction {
    pub async fn execute(
        &self,
        _ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        let note = &detection.note;
        if !self.event_tracker.track(&note.common_name, EventKind::Log) {
            debug!(species = %note.common_name, "log suppressed by event tracker");
            return Ok(());
        }
        info!(
            species = %note.common_name,
            scientific = %note.scientific_name,
            confidence = note.confidence,
            source = %note.source,
            clip = %note.clip_name,
            "detection"
        );
        Ok(())
    }
}
