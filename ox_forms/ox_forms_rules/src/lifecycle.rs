use crate::error::BridgeError;
use log::debug;
use std::sync::{Mutex, PoisonError};

/// Phases of one adaptive form instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Restoring,
    Ready,
    Submitting,
    SubmitSuccess,
    SubmitFailure,
    Disposed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Uninitialized, Initializing) => true,
            (Initializing, Restoring) => true,
            (Restoring, Ready) => true,
            (Ready, Submitting) => true,
            (Submitting, SubmitSuccess) | (Submitting, SubmitFailure) => true,
            (SubmitSuccess, Ready) | (SubmitFailure, Ready) => true,
            (SubmitSuccess, Submitting) | (SubmitFailure, Submitting) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transition(&self, next: LifecycleState) -> Result<(), BridgeError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(BridgeError::Lifecycle {
                from: *state,
                to: next,
            });
        }
        debug!("Form lifecycle {:?} -> {:?}", *state, next);
        *state = next;
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == LifecycleState::Disposed
    }
}
