//! Side-effecting actions dispatched for every confirmed detection.
//!
//! Actions are a closed sum: the planner builds a list of variants per
//! detection and the job queue invokes them through the single `execute`
//! entry point. Every variant gates itself on the event tracker before
//! touching its downstream, so rate limiting happens at dispatch time no
//! matter which path enqueued the action.

pub mod broadcast;
pub mod command;
pub mod composite;
pub mod log;
pub mod persist;
pub mod planner;
pub mod publish;
pub mod range_filter;
pub mod submit;

pub use broadcast::BroadcastAction;
pub use command::CommandAction;
pub use composite::CompositeAction;
pub use log::LogAction;
pub use persist::PersistAction;
pub use planner::{ActionDeps, ActionPlanner};
pub use publish::PublishAction;
pub use range_filter::{RangeFilterRefreshAction, RangeFilterState};
pub use submit::SubmitAction;

use crate::error::ActionError;
use crate::jobqueue::RetryConfig;
use crate::notes::Detection;
use aviary_foundation::SharedClock;
use std::future::Future;
use std::pin::Pin;

/// Per-invocation context handed to every action.
#[derive(Clone)]
pub struct ActionContext {
    pub clock: SharedClock,
}

pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>>;

/// One schedulable side effect.
#[derive(Clone)]
pub enum Action {
    Log(LogAction),
    Persist(PersistAction),
    Submit(SubmitAction),
    Publish(PublishAction),
    Broadcast(BroadcastAction),
    Command(CommandAction),
    RefreshRangeFilter(RangeFilterRefreshAction),
    Composite(CompositeAction),
}

impl Action {
    /// Human-readable label for logs and job bookkeeping.
    pub fn description(&self) -> String {
        match self {
            Action::Log(_) => "log detection".to_string(),
            Action::Persist(_) => "persist detection".to_string(),
            Action::Submit(_) => "submit detection upstream".to_string(),
            Action::Publish(a) => format!("publish detection to {}", a.topic),
            Action::Broadcast(_) => "broadcast detection".to_string(),
            Action::Command(a) => format!("execute command: {}", a.command),
            Action::RefreshRangeFilter(_) => "refresh species range filter".to_string(),
            Action::Composite(a) => format!("composite of {} actions", a.actions.len()),
        }
    }

    /// Retry policy the job queue applies to failures of this action.
    pub fn retry_config(&self) -> RetryConfig {
        match self {
            Action::Submit(a) => a.retry.clone(),
            Action::Publish(a) => a.retry.clone(),
            Action::Broadcast(a) => a.retry.clone(),
            Action::Composite(a) => a.retry.clone(),
            // Local, cheap or non-idempotent actions run once.
            Action::Log(_)
            | Action::Persist(_)
            | Action::Command(_)
            | Action::RefreshRangeFilter(_) => RetryConfig::disabled(),
        }
    }

    /// Execute against one detection. Boxed so composites can recurse.
    pub fn execute<'a>(
        &'a self,
        ctx: &'a ActionContext,
        detection: &'a Detection,
    ) -> ActionFuture<'a> {
        Box::pin(async move {
            match self {
                Action::Log(a) => a.execute(ctx, detection).await,
                Action::Persist(a) => a.execute(ctx, detection).await,
                Action::Submit(a) => a.execute(ctx, detection).await,
                Action::Publish(a) => a.execute(ctx, detection).await,
                Action::Broadcast(a) => a.execute(ctx, detection).await,
                Action::Command(a) => a.execute(ctx, detection).await,
                Action::RefreshRangeFilter(a) => a.execute(ctx, detection).await,
                Action::Composite(a) => a.execute(ctx, detection).await,
            }
        })
    }
}
