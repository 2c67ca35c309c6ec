use crate::actions::ActionContext;
use crate::detect::event_tracker::{EventKind, EventTracker};
use crate::error::ActionError;
use crate::external::MessageBroker;
use crate::jobqueue::RetryConfig;
use crate::notes::Detection;
use std::sync::Arc;
use tracing::debug;

/// Publishes the note as JSON to the message broker.
#[derive(Clone)]
pub struct PublishAction {
    pub broker: Arc<dyn MessageBroker>,
    pub topic: String,
    pub event_tracker: Arc<EventTracker>,
    pub retry: RetryConfig,
}

impl PublishAction {
    pub async fn execute(
        &self,
        _ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        let note = &detection.note;
        if !self.event_tracker.track(&note.common_name, EventKind::Publish) {
            debug!(species = %note.common_name, "publish suppressed by event tracker");
            return Ok(());
        }

        let payload = serde_json::to_string(note).map_err(|e| ActionError::Validation {
            component: "broker",
            operation: "encode_payload",
            message: e.to_string(),
        })?;
        self.broker.publish(&self.topic, &payload).await?;
        debug!(species = %note.common_name, topic = %self.topic, "detection published");
        Ok(())
    }
}
