use crate::lifecycle::LifecycleState;
use ox_forms::model::ModelError;
use ox_forms::FormError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// A worker message arrived out of the `init -> decorated -> restore ->
    /// fieldChanged* -> sync-complete` order.
    #[error("protocol violation: expected {expected}, got {got}")]
    Protocol { expected: String, got: String },

    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    Lifecycle {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// The worker side went away before the handshake completed.
    #[error("worker disconnected during {0}")]
    Disconnected(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Form(#[from] FormError),
}

impl BridgeError {
    pub fn protocol(expected: impl Into<String>, got: impl Into<String>) -> Self {
        BridgeError::Protocol {
            expected: expected.into(),
            got: got.into(),
        }
    }
}
