use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tracing::info;

use crate::forwarder::{ForwardPayload, SendError, SendSink};
use crate::pipeline::{MessageEvent, PipelineRouter};
use crate::runtime::AppState;

/// Delivery through the Bot API. `copy_message` re-posts the original
/// message (text or media) into the destination without a forward header, so
/// content passes through untouched.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl SendSink for TelegramSink {
    async fn send(&self, dest_chat_id: i64, payload: &ForwardPayload) -> Result<(), SendError> {
        self.bot
            .copy_message(
                ChatId(dest_chat_id),
                ChatId(payload.source_chat_id),
                MessageId(payload.message_id as i32),
            )
            .disable_notification(true)
            .await
            .map(|_| ())
            .map_err(classify_send_error)
    }
}

/// Rate limits and transport faults are retryable; everything the API itself
/// rejects is not.
pub(crate) fn classify_send_error(err: teloxide::RequestError) -> SendError {
    use teloxide::RequestError;
    let transient = matches!(
        err,
        RequestError::RetryAfter(_) | RequestError::Network(_) | RequestError::Io(_)
    );
    if transient {
        SendError::Transient(err.to_string())
    } else {
        SendError::Permanent(err.to_string())
    }
}

/// Runs the long-polling dispatcher until ctrl-c. The polling listener
/// retries dropped connections with backoff internally, and identity dedup
/// absorbs whatever the provider redelivers after a reconnect.
pub async fn run_listener(state: Arc<AppState>, bot: Bot, router: PipelineRouter) {
    info!(
        "Starting Telegram listener for {} source chat(s)",
        state.config.source_chats.len()
    );
    state.health.ingestion_alive.store(true, Ordering::SeqCst);

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(dptree::deps![state.clone(), router])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    state.health.ingestion_alive.store(false, Ordering::SeqCst);
}

async fn handle_message(
    msg: teloxide::types::Message,
    state: Arc<AppState>,
    router: PipelineRouter,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let chat_id = msg.chat.id.0;
    if !state.config.source_chats.contains(&chat_id) {
        return Ok(());
    }

    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or_default()
        .to_string();

    router
        .dispatch(MessageEvent {
            source_chat_id: chat_id,
            message_id: msg.id.0 as i64,
            text,
        })
        .await;
    Ok(())
}
