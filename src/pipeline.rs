use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::db::Admission;
use crate::forwarder::{ForwardPayload, Forwarder};
use crate::runtime::AppState;

/// One inbound message from a source conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub source_chat_id: i64,
    pub message_id: i64,
    pub text: String,
}

const WORKER_QUEUE_DEPTH: usize = 256;

/// Routes inbound events to per-source-chat workers. Events for one source
/// chat are processed in arrival order; different chats proceed concurrently.
#[derive(Clone)]
pub struct PipelineRouter {
    senders: Arc<HashMap<i64, mpsc::Sender<MessageEvent>>>,
}

impl PipelineRouter {
    pub fn spawn(
        state: Arc<AppState>,
        forwarder: Arc<Forwarder>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut senders = HashMap::new();
        for &chat_id in &state.config.source_chats {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
            senders.insert(chat_id, tx);
            tokio::spawn(run_worker(
                state.clone(),
                forwarder.clone(),
                chat_id,
                rx,
                shutdown.clone(),
            ));
        }
        Self {
            senders: Arc::new(senders),
        }
    }

    /// Enqueues an event for its source chat's worker. Events for chats that
    /// are not configured sources are dropped.
    pub async fn dispatch(&self, event: MessageEvent) {
        let Some(tx) = self.senders.get(&event.source_chat_id) else {
            return;
        };
        if tx.send(event).await.is_err() {
            warn!("Pipeline worker is gone, dropping event");
        }
    }
}

async fn run_worker(
    state: Arc<AppState>,
    forwarder: Arc<Forwarder>,
    chat_id: i64,
    mut rx: mpsc::Receiver<MessageEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Pipeline worker started for chat {chat_id}");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                process_event(&state, &forwarder, event).await;
            }
        }
    }
    debug!("Pipeline worker stopped for chat {chat_id}");
}

pub(crate) async fn process_event(
    state: &Arc<AppState>,
    forwarder: &Forwarder,
    event: MessageEvent,
) {
    let decision = match state
        .dedup
        .admit(event.source_chat_id, event.message_id, &event.text)
    {
        Ok(decision) => decision,
        Err(e) => {
            // Without a dedup verdict nothing may be forwarded.
            error!(
                "Admission failed for {}:{}: {e}",
                event.source_chat_id, event.message_id
            );
            return;
        }
    };

    match decision {
        Admission::DuplicateMessage => {
            debug!(
                "[skip] Already processed {}:{}",
                event.source_chat_id, event.message_id
            );
        }
        Admission::DuplicateCode { known_codes } => {
            info!(
                "[skip] Duplicate codes {} in {}:{}",
                known_codes.join(","),
                event.source_chat_id,
                event.message_id
            );
        }
        Admission::Accepted { new_codes } => {
            let payload = ForwardPayload {
                source_chat_id: event.source_chat_id,
                message_id: event.message_id,
            };
            match forwarder.forward(&payload).await {
                Ok(()) => {
                    info!(
                        "[ok] Forwarded {}:{}",
                        event.source_chat_id, event.message_id
                    );
                    if !new_codes.is_empty() {
                        debug!("Recorded codes {}", new_codes.join(","));
                    }
                    state.stats.messages_forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // The record stays: the message is seen, not delivered,
                    // and its redelivery must not be forwarded.
                    error!(
                        "Failed to forward {}:{}: {e}",
                        event.source_chat_id, event.message_id
                    );
                }
            }
        }
    }
}
