pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod init;
pub mod lifecycle;
pub mod prefill;
pub mod runtime;
pub mod worker;

pub use bridge::RuleEngineBridge;
pub use dispatch::{apply_mutation, plan_mutation, DomMutation};
pub use error::BridgeError;
pub use host::{ChannelHost, InProcessHost, WorkerHost};
pub use init::{init_adaptive_form, PageRequest};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use prefill::{extract_prefill, fetch_prefill};
pub use runtime::{FormRuntime, FormRuntimeFactory, RuntimeFactory};
pub use worker::{FromWorker, InitPayload, RuleEngineWorker, ToWorker};

#[cfg(test)]
mod tests;
