use crate::actions::{Action, ActionContext};
use crate::error::ActionError;
use crate::jobqueue::RetryConfig;
use crate::notes::Detection;
use std::time::Duration;
use tracing::{debug, error};

/// Default ceiling on a whole composite run.
pub const COMPOSITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs sub-actions strictly in declared order inside one timeout.
///
/// Each sub-action starts only after the previous one returned; the first
/// error, timeout or panic stops the remainder. Completed sub-actions are
/// not rolled back. The canonical use is persist-before-broadcast: the
/// broadcast reads the persisted row, so the two must not race.
#[derive(Clone)]
pub struct CompositeAction {
    pub actions: Vec<Action>,
    pub timeout: Duration,
    /// Optional ceiling per sub-action on top of the overall timeout.
    pub per_action_budget: Option<Duration>,
    pub retry: RetryConfig,
}

impl CompositeAction {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            timeout: COMPOSITE_TIMEOUT,
            per_action_budget: None,
            retry: RetryConfig::disabled(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_per_action_budget(mut self, budget: Duration) -> Self {
        self.per_action_budget = Some(budget);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn execute(
        &self,
        ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        if self.actions.is_empty() {
            return Ok(());
        }

        let run = async {
            for (index, action) in self.actions.iter().enumerate() {
                self.run_sub_action(index, action, ctx, detection).await?;
            }
            Ok(())
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    timeout_secs = self.timeout.as_secs(),
                    "composite action timed out, remaining sub-actions skipped"
                );
                Err(ActionError::Timeout {
                    component: "composite",
                    operation: "execute",
                })
            }
        }
    }

    /// One sub-action on its own task, so a panic inside it is contained
    /// and surfaces as a composite error instead of tearing the worker down.
    async fn run_sub_action(
        &self,
        index: usize,
        action: &Action,
        ctx: &ActionContext,
        detection: &Detection,
    ) -> Result<(), ActionError> {
        let description = action.description();
        debug!(index, action = %description, "composite sub-action starting");

        let mut handle = {
            let action = action.clone();
            let ctx = ctx.clone();
            let detection = detection.clone();
            tokio::spawn(async move { action.execute(&ctx, &detection).await })
        };

        let joined = match self.per_action_budget {
            Some(budget) => match tokio::time::timeout(budget, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    error!(index, action = %description, "sub-action exceeded its budget");
                    return Err(ActionError::Timeout {
                        component: "composite",
                        operation: "sub_action",
                    });
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => {
                if let Err(ref err) = result {
                    error!(index, action = %description, error = %err, "sub-action failed, aborting composite");
                }
                result
            }
            Err(join_err) if join_err.is_panic() => {
                error!(index, action = %description, "sub-action panicked, aborting composite");
                Err(ActionError::Panicked {
                    component: "composite",
                    message: description,
                })
            }
            Err(_) => Err(ActionError::Timeout {
                component: "composite",
                operation: "sub_action",
            }),
        }
    }
}
