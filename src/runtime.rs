//! Per-conversation dispatch
//!
//! Each conversation gets its own worker task fed by a channel, so messages
//! from one sender are handled in arrival order while different senders
//! proceed independently.

pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::router::{is_group, CommandRouter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// How long a worker waits for its next message before shutting down
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

type WorkerMap = Arc<RwLock<HashMap<String, ConversationHandle>>>;

/// A text message received from a remote party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub text: String,
}

/// Handle to a running conversation worker
#[derive(Clone)]
pub struct ConversationHandle {
    pub event_tx: mpsc::UnboundedSender<String>,
}

/// Routes inbound messages to per-conversation workers
pub struct ConversationDispatcher {
    router: CommandRouter,
    sender: Arc<dyn MessageSender>,
    workers: WorkerMap,
    idle_timeout: Duration,
}

impl ConversationDispatcher {
    pub fn new(router: CommandRouter, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            router,
            sender,
            workers: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: WORKER_IDLE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Consume inbound messages until the channel closes
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            self.dispatch(message).await;
        }
        tracing::info!("Inbound channel closed, dispatcher stopped");
    }

    /// Queue a message on its conversation's worker without waiting on it.
    ///
    /// Queues are only written under the worker map lock, so an idle worker
    /// can retire without losing messages.
    pub async fn dispatch(&self, message: InboundMessage) {
        let InboundMessage {
            conversation_id,
            text,
        } = message;
        if is_group(&conversation_id) {
            tracing::debug!(conv_id = %conversation_id, "Ignoring group message");
            return;
        }

        let Err(text) = queue(&*self.workers.read().await, &conversation_id, text) else {
            return;
        };

        let mut workers = self.workers.write().await;
        // Another dispatch may have started the worker meanwhile
        let Err(text) = queue(&workers, &conversation_id, text) else {
            return;
        };
        if workers.contains_key(&conversation_id) {
            tracing::warn!(conv_id = %conversation_id, "Conversation worker gone, restarting");
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            conversation_id.clone(),
            self.router.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.workers),
            self.idle_timeout,
            event_rx,
        ));
        tracing::debug!(conv_id = %conversation_id, "Started conversation worker");

        if event_tx.send(text).is_err() {
            tracing::error!(conv_id = %conversation_id, "Dropping message, worker unavailable");
        }
        workers.insert(conversation_id, ConversationHandle { event_tx });
    }

    pub async fn active_workers(&self) -> usize {
        self.workers.read().await.len()
    }
}

/// Hand `text` to a live worker, or give it back
fn queue(workers: &HashMap<String, ConversationHandle>, conversation_id: &str, text: String) -> Result<(), String> {
    match workers.get(conversation_id) {
        Some(handle) => handle
            .event_tx
            .send(text)
            .map_err(|mpsc::error::SendError(text)| text),
        None => Err(text),
    }
}

async fn run_worker(
    conversation_id: String,
    router: CommandRouter,
    sender: Arc<dyn MessageSender>,
    workers: WorkerMap,
    idle_timeout: Duration,
    mut event_rx: mpsc::UnboundedReceiver<String>,
) {
    loop {
        let text = match tokio::time::timeout(idle_timeout, event_rx.recv()).await {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(_) => {
                // Nothing can be queued while the write lock is held
                let mut workers = workers.write().await;
                match event_rx.try_recv() {
                    Ok(text) => text,
                    Err(_) => {
                        workers.remove(&conversation_id);
                        tracing::debug!(conv_id = %conversation_id, "Conversation worker idle, stopping");
                        break;
                    }
                }
            }
        };

        let Some(reply) = router.handle(&conversation_id, &text).await else {
            continue;
        };
        if sender.send(&conversation_id, &reply).await.is_none() {
            tracing::warn!(conv_id = %conversation_id, "Reply could not be delivered");
        }
    }
    tracing::debug!(conv_id = %conversation_id, "Conversation worker finished");
}
