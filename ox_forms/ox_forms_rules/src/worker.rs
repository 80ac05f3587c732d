//! The rule engine worker and its message protocol.
//!
//! Handshake, main thread on the left:
//!
//! ```text
//! init(definition, search) ->
//!                          <- init(state)
//! decorated                ->
//!                          <- restore(state after prefill)
//!                          <- fieldChanged*
//!                          <- sync-complete
//! ```

use crate::error::BridgeError;
use crate::prefill::fetch_prefill;
use crate::runtime::RuntimeFactory;
use log::debug;
use ox_forms::config::FormsConfig;
use ox_forms::http::HttpClient;
use ox_forms::model::{FieldChangedPayload, FieldModelRuntime, ModelEvent};
use ox_forms::schema::FormDefinition;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InitPayload {
    #[serde(flatten)]
    pub definition: FormDefinition,
    /// Query string of the page, forwarded to the prefill service.
    #[serde(default)]
    pub search: String,
}

/// Main thread → worker.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "name", content = "payload", rename_all = "camelCase")]
pub enum ToWorker {
    Init(Box<InitPayload>),
    Decorated,
}

impl ToWorker {
    pub fn name(&self) -> &'static str {
        match self {
            ToWorker::Init(_) => "init",
            ToWorker::Decorated => "decorated",
        }
    }
}

/// Worker → main thread.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "name", content = "payload")]
pub enum FromWorker {
    #[serde(rename = "init")]
    Init(Box<FormDefinition>),
    #[serde(rename = "restore")]
    Restore(Box<FormDefinition>),
    #[serde(rename = "fieldChanged")]
    FieldChanged(Box<FieldChangedPayload>),
    #[serde(rename = "sync-complete")]
    SyncComplete,
}

impl FromWorker {
    pub fn name(&self) -> &'static str {
        match self {
            FromWorker::Init(_) => "init",
            FromWorker::Restore(_) => "restore",
            FromWorker::FieldChanged(_) => "fieldChanged",
            FromWorker::SyncComplete => "sync-complete",
        }
    }
}

enum Phase {
    AwaitingInit,
    AwaitingDecorated {
        model: Arc<dyn FieldModelRuntime>,
        changes: UnboundedReceiver<ModelEvent>,
        form_id: String,
        search: String,
    },
    Synced,
}

impl Phase {
    fn expects(&self) -> &'static str {
        match self {
            Phase::AwaitingInit => "init",
            Phase::AwaitingDecorated { .. } => "decorated",
            Phase::Synced => "no further messages",
        }
    }
}

/// Owns a field model of its own and drives it through initialization and
/// prefill on behalf of the main thread.
pub struct RuleEngineWorker {
    factory: Arc<dyn RuntimeFactory>,
    http: Arc<dyn HttpClient>,
    config: Arc<FormsConfig>,
    phase: Phase,
}

impl RuleEngineWorker {
    pub fn new(factory: Arc<dyn RuntimeFactory>, http: Arc<dyn HttpClient>, config: Arc<FormsConfig>) -> Self {
        Self {
            factory,
            http,
            config,
            phase: Phase::AwaitingInit,
        }
    }

    /// Handles one message and returns the replies in send order.
    pub async fn handle(&mut self, message: ToWorker) -> Result<Vec<FromWorker>, BridgeError> {
        match (std::mem::replace(&mut self.phase, Phase::Synced), message) {
            (Phase::AwaitingInit, ToWorker::Init(payload)) => {
                let InitPayload { definition, search } = *payload;
                let form_id = definition.id.clone();
                let model = self.factory.create(definition);
                let changes = model.subscribe();
                let state = model.get_state();
                debug!("Worker initialized form '{}'", form_id);
                self.phase = Phase::AwaitingDecorated {
                    model,
                    changes,
                    form_id,
                    search,
                };
                Ok(vec![FromWorker::Init(Box::new(state))])
            }
            (
                Phase::AwaitingDecorated {
                    model,
                    mut changes,
                    form_id,
                    search,
                },
                ToWorker::Decorated,
            ) => {
                if let Some(data) = fetch_prefill(self.http.as_ref(), &self.config, &form_id, &search).await {
                    model.import_data(&data);
                }
                model.wait_for_promises().await;
                let mut replies = vec![FromWorker::Restore(Box::new(model.get_state()))];
                while let Ok(event) = changes.try_recv() {
                    if let ModelEvent::FieldChanged(payload) = event {
                        replies.push(FromWorker::FieldChanged(Box::new(payload)));
                    }
                }
                debug!(
                    "Worker restored form '{}' with {} field changes",
                    form_id,
                    replies.len() - 1
                );
                replies.push(FromWorker::SyncComplete);
                Ok(replies)
            }
            (phase, message) => {
                let expected = phase.expects();
                self.phase = phase;
                Err(BridgeError::protocol(expected, message.name()))
            }
        }
    }
}
