use crate::actions::ActionContext;
use crate::detect::event_tracker::{EventKind, EventTracker};
use crate::error::ActionError;
use crate::external::SoundscapeUploader;
use crate::jobqueue::RetryConfig;
use crate::notes::Detection;
use std::sync::Arc;
use tracing::debug;

/// Uploads the audio clip and posts the detection to the third-party
/// service. Transport failures are retried by the job queue.
#[derive(Clone)]
pub struct SubmitAction {
    pub uploader: Arc<dyn SoundscapeUploader>,
    pub event_tracker: Arc<EventTracker>,
    pub retry: RetryConfig,
}

impl SubmitAction {
    pub async fn execute(
        &self,
        _ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        let note = &detection.note;
        if !self.event_tracker.track(&note.common_name, EventKind::Submit) {
            debug!(species = %note.common_name, "submit suppressed by event tracker");
            return Ok(());
        }

        let timestamp = format!("{} {}", note.date, note.time);
        let soundscape_id = self
            .uploader
            .upload_soundscape(&timestamp, &detection.pcm)
            .await?;
        self.uploader
            .post_detection(
                &soundscape_id,
                &timestamp,
                &note.common_name,
                &note.scientific_name,
                note.confidence,
            )
            .await?;
        debug!(species = %note.common_name, soundscape_id = %soundscape_id, "detection submitted");
        Ok(())
    }
}
