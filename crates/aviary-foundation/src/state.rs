use crate::error::AppError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Pipeline lifecycle. Transitions are validated; observers get every change
/// on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

pub struct StateManager {
    state: Arc<RwLock<PipelineState>>,
    state_tx: Sender<PipelineState>,
    state_rx: Receiver<PipelineState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(PipelineState::Initializing)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: PipelineState) -> Result<(), AppError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (PipelineState::Initializing, PipelineState::Running)
                | (PipelineState::Initializing, PipelineState::Stopping)
                | (PipelineState::Running, PipelineState::Stopping)
                | (PipelineState::Stopping, PipelineState::Stopped)
        );

        if !valid {
            return Err(AppError::InvalidTransition {
                from: format!("{:?}", *current),
                to: format!("{:?}", new_state),
            });
        }

        tracing::info!("state transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> PipelineState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<PipelineState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_is_valid() {
        let sm = StateManager::new();
        assert_eq!(sm.current(), PipelineState::Initializing);
        sm.transition(PipelineState::Running).unwrap();
        sm.transition(PipelineState::Stopping).unwrap();
        sm.transition(PipelineState::Stopped).unwrap();
        assert_eq!(sm.current(), PipelineState::Stopped);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let sm = StateManager::new();
        assert!(sm.transition(PipelineState::Stopped).is_err());
        assert_eq!(sm.current(), PipelineState::Initializing);
    }

    #[test]
    fn subscribers_see_transitions() {
        let sm = StateManager::new();
        let rx = sm.subscribe();
        sm.transition(PipelineState::Running).unwrap();
        assert_eq!(rx.try_recv().unwrap(), PipelineState::Running);
    }
}
