//! Where the worker runs: in the calling task, or on its own Tokio task
//! behind a JSON message channel.

use crate::error::BridgeError;
use crate::worker::{FromWorker, RuleEngineWorker, ToWorker};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::VecDeque;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Main-thread end of the worker protocol.
#[async_trait]
pub trait WorkerHost: Send {
    async fn send(&mut self, message: ToWorker) -> Result<(), BridgeError>;
    async fn next_message(&mut self) -> Result<FromWorker, BridgeError>;
}

/// Runs the worker synchronously inside `send`; replies queue up until read.
pub struct InProcessHost {
    worker: RuleEngineWorker,
    outbox: VecDeque<FromWorker>,
}

impl InProcessHost {
    pub fn new(worker: RuleEngineWorker) -> Self {
        Self {
            worker,
            outbox: VecDeque::new(),
        }
    }
}

#[async_trait]
impl WorkerHost for InProcessHost {
    async fn send(&mut self, message: ToWorker) -> Result<(), BridgeError> {
        let replies = self.worker.handle(message).await?;
        self.outbox.extend(replies);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<FromWorker, BridgeError> {
        self.outbox
            .pop_front()
            .ok_or_else(|| BridgeError::Disconnected("in-process handshake".to_string()))
    }
}

/// Runs the worker on a spawned task. Messages cross the channel as JSON,
/// the way they would cross a thread or process boundary.
pub struct ChannelHost {
    to_worker: UnboundedSender<String>,
    from_worker: UnboundedReceiver<Result<String, BridgeError>>,
    task: JoinHandle<()>,
}

impl ChannelHost {
    /// Spawns `worker` on the current Tokio runtime.
    pub fn spawn(worker: RuleEngineWorker) -> Self {
        let (to_worker, inbox) = unbounded_channel();
        let (outbox, from_worker) = unbounded_channel();
        let task = tokio::spawn(serve(worker, inbox, outbox));
        Self {
            to_worker,
            from_worker,
            task,
        }
    }
}

async fn serve(
    mut worker: RuleEngineWorker,
    mut inbox: UnboundedReceiver<String>,
    outbox: UnboundedSender<Result<String, BridgeError>>,
) {
    while let Some(raw) = inbox.recv().await {
        let replies = match serde_json::from_str::<ToWorker>(&raw) {
            Ok(message) => worker.handle(message).await,
            Err(e) => Err(BridgeError::protocol("a worker message", e.to_string())),
        };
        let encoded: Vec<Result<String, BridgeError>> = match replies {
            Ok(replies) => replies
                .iter()
                .map(|reply| {
                    serde_json::to_string(reply)
                        .map_err(|e| BridgeError::protocol(reply.name(), e.to_string()))
                })
                .collect(),
            Err(e) => vec![Err(e)],
        };
        for reply in encoded {
            if outbox.send(reply).is_err() {
                debug!("Main thread went away; worker stopping");
                return;
            }
        }
    }
}

#[async_trait]
impl WorkerHost for ChannelHost {
    async fn send(&mut self, message: ToWorker) -> Result<(), BridgeError> {
        let raw = serde_json::to_string(&message)
            .map_err(|e| BridgeError::protocol(message.name(), e.to_string()))?;
        self.to_worker
            .send(raw)
            .map_err(|_| BridgeError::Disconnected(message.name().to_string()))
    }

    async fn next_message(&mut self) -> Result<FromWorker, BridgeError> {
        let raw = self
            .from_worker
            .recv()
            .await
            .ok_or_else(|| BridgeError::Disconnected("worker reply".to_string()))??;
        serde_json::from_str(&raw).map_err(|e| {
            warn!("Unreadable worker message: {}", e);
            BridgeError::protocol("a worker reply", e.to_string())
        })
    }
}

impl Drop for ChannelHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}
