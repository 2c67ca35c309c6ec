use crate::actions::{
    Action, BroadcastAction, CommandAction, CompositeAction, LogAction, PersistAction,
    PublishAction, RangeFilterRefreshAction, RangeFilterState, SubmitAction,
};
use crate::config::{ActionKind, Settings};
use crate::detect::event_tracker::EventTracker;
use crate::external::{Datastore, LiveBroadcaster, MessageBroker, SoundscapeUploader};
use crate::jobqueue::RetryConfig;
use crate::notes::Detection;
use aviary_foundation::SharedClock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Collaborators the planner wires into the actions it builds.
#[derive(Clone)]
pub struct ActionDeps {
    pub store: Arc<dyn Datastore>,
    pub uploader: Option<Arc<dyn SoundscapeUploader>>,
    pub broker: Option<Arc<dyn MessageBroker>>,
    pub broadcaster: Option<Arc<dyn LiveBroadcaster>>,
    pub event_tracker: Arc<EventTracker>,
    pub range_filter: Arc<RangeFilterState>,
}

/// Produces the ordered action list for a confirmed detection.
pub struct ActionPlanner {
    settings: Arc<Settings>,
    deps: ActionDeps,
    clock: SharedClock,
}

impl ActionPlanner {
    pub fn new(settings: Arc<Settings>, deps: ActionDeps, clock: SharedClock) -> Self {
        Self {
            settings,
            deps,
            clock,
        }
    }

    /// Custom actions for the species when configured; defaults otherwise.
    /// A custom spec asking for `execute_defaults` appends the defaults
    /// after the customs.
    pub fn actions_for(&self, detection: &Detection) -> Vec<Action> {
        let species_lower = detection.note.common_name.to_lowercase();

        if let Some(config) = self.settings.realtime.species.get(&species_lower) {
            let mut custom = Vec::new();
            let mut execute_defaults = false;
            for spec in &config.actions {
                if spec.execute_defaults {
                    execute_defaults = true;
                }
                match spec.action_type {
                    ActionKind::ExecuteCommand if !spec.command.is_empty() => {
                        custom.push(Action::Command(CommandAction {
                            command: spec.command.clone(),
                            parameters: spec.parameters.clone(),
                        }));
                    }
                    ActionKind::ExecuteCommand => {}
                    // Notification delivery rides the default action list.
                    ActionKind::SendNotification => {}
                }
            }
            if !custom.is_empty() {
                debug!(species = %species_lower, count = custom.len(), "using custom species actions");
                if execute_defaults {
                    custom.extend(self.default_actions());
                }
                return custom;
            }
        }

        self.default_actions()
    }

    fn default_actions(&self) -> Vec<Action> {
        let mut actions = Vec::new();
        let realtime = &self.settings.realtime;
        let tracker = &self.deps.event_tracker;

        if realtime.log.enabled {
            actions.push(Action::Log(LogAction {
                event_tracker: tracker.clone(),
            }));
        }

        // Persist before broadcast, sequenced inside one composite: the
        // live stream reads the persisted row.
        if realtime.store.enabled {
            let persist = Action::Persist(PersistAction {
                store: self.deps.store.clone(),
                event_tracker: tracker.clone(),
            });
            match &self.deps.broadcaster {
                Some(broadcaster) => {
                    let broadcast = Action::Broadcast(BroadcastAction {
                        broadcaster: broadcaster.clone(),
                        event_tracker: tracker.clone(),
                        retry: RetryConfig::disabled(),
                    });
                    actions.push(Action::Composite(
                        CompositeAction::new(vec![persist, broadcast])
                            .with_retry(broadcast_retry()),
                    ));
                }
                None => actions.push(persist),
            }
        } else if let Some(broadcaster) = &self.deps.broadcaster {
            actions.push(Action::Broadcast(BroadcastAction {
                broadcaster: broadcaster.clone(),
                event_tracker: tracker.clone(),
                retry: broadcast_retry(),
            }));
        }

        if realtime.submit.enabled {
            if let Some(uploader) = &self.deps.uploader {
                actions.push(Action::Submit(SubmitAction {
                    uploader: uploader.clone(),
                    event_tracker: tracker.clone(),
                    retry: RetryConfig::from(&realtime.submit.retry),
                }));
            }
        }

        if realtime.publish.enabled {
            if let Some(broker) = &self.deps.broker {
                actions.push(Action::Publish(PublishAction {
                    broker: broker.clone(),
                    topic: realtime.publish.topic.clone(),
                    event_tracker: tracker.clone(),
                    retry: RetryConfig::from(&realtime.publish.retry),
                }));
            }
        }

        // Once per day, piggy-backed on whichever detection comes first.
        let today = DateTime::<Utc>::from(self.clock.system_now()).date_naive();
        if self.deps.range_filter.needs_refresh(today) {
            actions.push(Action::RefreshRangeFilter(RangeFilterRefreshAction {
                state: self.deps.range_filter.clone(),
            }));
        }

        actions
    }
}

/// Live-stream pushes retry up to 3 times, 1 s backing off to 5 s.
fn broadcast_retry() -> RetryConfig {
    RetryConfig {
        enabled: true,
        max_retries: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(5),
        multiplier: 2.0,
    }
}
