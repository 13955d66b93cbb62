use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Rate limiting or a network fault; worth retrying after a delay.
    #[error("transient send failure: {0}")]
    Transient(String),
    /// The provider rejected the message; retrying cannot help.
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

/// Provenance of the message to mirror. Delivery is pass-through: the
/// provider copies the original content (text or media) server-side, so the
/// payload only needs to say which message to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardPayload {
    pub source_chat_id: i64,
    pub message_id: i64,
}

/// The outbound half of the chat provider.
#[async_trait]
pub trait SendSink: Send + Sync {
    async fn send(&self, dest_chat_id: i64, payload: &ForwardPayload) -> Result<(), SendError>;
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Sends accepted messages to the destination chat, retrying transient
/// failures with bounded exponential backoff. Admission is already committed
/// by the time a forward starts; a failed forward is reported to the caller
/// and never unwinds dedup state.
pub struct Forwarder {
    sink: Arc<dyn SendSink>,
    dest_chat_id: i64,
    retry: RetryPolicy,
}

impl Forwarder {
    pub fn new(sink: Arc<dyn SendSink>, dest_chat_id: i64) -> Self {
        Self {
            sink,
            dest_chat_id,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn forward(&self, payload: &ForwardPayload) -> Result<(), SendError> {
        let max_attempts = self.retry.max_retries + 1;
        for attempt in 0..max_attempts {
            match self.sink.send(self.dest_chat_id, payload).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(
                            source_chat_id = payload.source_chat_id,
                            message_id = payload.message_id,
                            attempt = attempt + 1,
                            "Forward succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                Err(SendError::Transient(reason)) if attempt < max_attempts - 1 => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        source_chat_id = payload.source_chat_id,
                        message_id = payload.message_id,
                        error = %reason,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient send failure, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop should have returned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        attempts: AtomicU32,
        fail_first: u32,
        error: SendError,
    }

    impl FlakySink {
        fn failing_with(fail_first: u32, error: SendError) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                fail_first,
                error,
            }
        }
    }

    #[async_trait]
    impl SendSink for FlakySink {
        async fn send(&self, _dest: i64, _payload: &ForwardPayload) -> Result<(), SendError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    const PAYLOAD: ForwardPayload = ForwardPayload {
        source_chat_id: 100,
        message_id: 1,
    };

    #[tokio::test]
    async fn test_forward_succeeds_first_attempt() {
        let sink = Arc::new(FlakySink::failing_with(
            0,
            SendError::Transient("unused".into()),
        ));
        let forwarder = Forwarder::new(sink.clone(), -1).with_retry_policy(fast_policy());
        forwarder.forward(&PAYLOAD).await.unwrap();
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forward_retries_transient_then_succeeds() {
        let sink = Arc::new(FlakySink::failing_with(
            2,
            SendError::Transient("rate limited".into()),
        ));
        let forwarder = Forwarder::new(sink.clone(), -1).with_retry_policy(fast_policy());
        forwarder.forward(&PAYLOAD).await.unwrap();
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_forward_exhausts_transient_retries() {
        let sink = Arc::new(FlakySink::failing_with(
            99,
            SendError::Transient("network down".into()),
        ));
        let forwarder = Forwarder::new(sink.clone(), -1).with_retry_policy(fast_policy());
        let err = forwarder.forward(&PAYLOAD).await.unwrap_err();
        assert!(matches!(err, SendError::Transient(_)));
        // max_retries=3 means 4 total attempts.
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_forward_permanent_failure_not_retried() {
        let sink = Arc::new(FlakySink::failing_with(
            99,
            SendError::Permanent("chat not found".into()),
        ));
        let forwarder = Forwarder::new(sink.clone(), -1).with_retry_policy(fast_policy());
        let err = forwarder.forward(&PAYLOAD).await.unwrap_err();
        assert!(matches!(err, SendError::Permanent(_)));
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_for_attempt_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(350));
    }
}
