use crate::actions::ActionContext;
use crate::error::ActionError;
use crate::notes::Detection;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Tracks when the location range filter was last rebuilt. The planner adds
/// one refresh action per day; the action records completion here.
#[derive(Default)]
pub struct RangeFilterState {
    last_updated: RwLock<Option<NaiveDate>>,
}

impl RangeFilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn needs_refresh(&self, today: NaiveDate) -> bool {
        self.last_updated.read().map_or(true, |last| last < today)
    }

    pub fn mark_updated(&self, today: NaiveDate) {
        *self.last_updated.write() = Some(today);
    }

    pub fn last_updated(&self) -> Option<NaiveDate> {
        *self.last_updated.read()
    }
}

/// Once-per-day rebuild of the location-based species allowlist.
#[derive(Clone)]
pub struct RangeFilterRefreshAction {
    pub state: Arc<RangeFilterState>,
}

impl RangeFilterRefreshAction {
    pub async fn execute(
        &self,
        ctx: &ActionContext,
        _detection: &Detection,
    ) -> Result<(), ActionError> {
        let today = DateTime::<Utc>::from(ctx.clock.system_now()).date_naive();
        if !self.state.needs_refresh(today) {
            return Ok(());
        }
        self.state.mark_updated(today);
        info!(%today, "species range filter refreshed");
        Ok(())
    }
}
