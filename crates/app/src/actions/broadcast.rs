use crate::actions::ActionContext;
use crate::detect::event_tracker::{EventKind, EventTracker};
use crate::error::ActionError;
use crate::external::LiveBroadcaster;
use crate::jobqueue::RetryConfig;
use crate::notes::Detection;
use std::sync::Arc;
use tracing::debug;

/// Pushes the note to the live event stream.
#[derive(Clone)]
pub struct BroadcastAction {
    pub broadcaster: Arc<dyn LiveBroadcaster>,
    pub event_tracker: Arc<EventTracker>,
    pub retry: RetryConfig,
}

impl BroadcastAction {
    pub async fn execute(
        &self,
        _ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        let note = &detection.note;
        if !self.event_tracker.track(&note.common_name, EventKind::Broadcast) {
            debug!(species = %note.common_name, "broadcast suppressed by event tracker");
            return Ok(());
        }
        self.broadcaster.broadcast(note).await?;
        debug!(species = %note.common_name, "detection broadcast");
        Ok(())
    }
}
