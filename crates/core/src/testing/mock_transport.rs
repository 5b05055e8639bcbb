//! Mock transport for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::transport::{MediaRef, MessageHandle, ReplyTarget, Transport, TransportError};

/// A recorded transport call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    FetchMedia {
        media: MediaRef,
    },
    SendMessage {
        target: ReplyTarget,
        text: String,
        handle: MessageHandle,
    },
    EditMessage {
        target: ReplyTarget,
        message: MessageHandle,
        text: String,
    },
    DeleteMessage {
        target: ReplyTarget,
        message: MessageHandle,
    },
    SendVideoNote {
        target: ReplyTarget,
        size_bytes: usize,
        side: u32,
    },
}

/// Mock implementation of the Transport trait.
///
/// Provides controllable behavior for testing:
/// - Record every call in order
/// - Serve configured bytes for media references
/// - Fail a number of fetches or deliveries
/// - Slow fetches down
/// - Panic on one chosen message text
///
/// # Example
///
/// ```rust,ignore
/// use roundnote_core::testing::MockTransport;
///
/// let transport = MockTransport::new();
/// transport.set_media("file-1", b"bytes".to_vec()).await;
/// transport.fail_next_deliveries(1).await;
///
/// // Run a job...
///
/// assert!(transport.sent_notes().await.is_empty());
/// ```
#[derive(Debug)]
pub struct MockTransport {
    calls: Arc<RwLock<Vec<TransportCall>>>,
    media: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fetch_failures: Arc<RwLock<usize>>,
    delivery_failures: Arc<RwLock<usize>>,
    fetch_delay: Arc<RwLock<Duration>>,
    panic_on_text: Arc<RwLock<Option<String>>>,
    next_handle: AtomicI64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Bytes served for media references with no configured content.
    pub const DEFAULT_MEDIA: &'static [u8] = b"mock video bytes";

    /// Create a new mock transport.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            media: Arc::new(RwLock::new(HashMap::new())),
            fetch_failures: Arc::new(RwLock::new(0)),
            delivery_failures: Arc::new(RwLock::new(0)),
            fetch_delay: Arc::new(RwLock::new(Duration::ZERO)),
            panic_on_text: Arc::new(RwLock::new(None)),
            next_handle: AtomicI64::new(1000),
        }
    }

    /// Serve `bytes` for `media`.
    pub async fn set_media(&self, media: &str, bytes: Vec<u8>) {
        self.media.write().await.insert(media.to_string(), bytes);
    }

    /// Fail the next `count` fetches with a connection error.
    pub async fn fail_next_fetches(&self, count: usize) {
        *self.fetch_failures.write().await = count;
    }

    /// Fail the next `count` video note deliveries with an API error.
    pub async fn fail_next_deliveries(&self, count: usize) {
        *self.delivery_failures.write().await = count;
    }

    /// Delay every fetch by `delay`.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.write().await = delay;
    }

    /// Panic the next time a message with exactly `text` is sent.
    pub async fn panic_on_next_message(&self, text: &str) {
        *self.panic_on_text.write().await = Some(text.to_string());
    }

    /// All calls in the order they were made.
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.read().await.clone()
    }

    /// Texts of all sent messages, in order.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::SendMessage { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Texts of messages sent to `target`, in order.
    pub async fn texts_for(&self, target: &ReplyTarget) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::SendMessage { target: t, text, .. } if t == target => {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Delivered video notes as `(target, size_bytes, side)`.
    pub async fn sent_notes(&self) -> Vec<(ReplyTarget, usize, u32)> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::SendVideoNote {
                    target,
                    size_bytes,
                    side,
                } => Some((*target, *size_bytes, *side)),
                _ => None,
            })
            .collect()
    }

    /// Number of fetch attempts.
    pub async fn fetch_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| matches!(call, TransportCall::FetchMedia { .. }))
            .count()
    }

    async fn record(&self, call: TransportCall) {
        self.calls.write().await.push(call);
    }

    fn handle(&self) -> MessageHandle {
        MessageHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
}

/// Decrements a failure budget, returning whether this call should fail.
async fn take_failure(budget: &RwLock<usize>) -> bool {
    let mut remaining = budget.write().await;
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_media(&self, media: &MediaRef) -> Result<Vec<u8>, TransportError> {
        self.record(TransportCall::FetchMedia {
            media: media.clone(),
        })
        .await;

        let delay = *self.fetch_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if take_failure(&self.fetch_failures).await {
            return Err(TransportError::ConnectionFailed(
                "mock fetch failure".to_string(),
            ));
        }

        Ok(self
            .media
            .read()
            .await
            .get(media.as_str())
            .cloned()
            .unwrap_or_else(|| Self::DEFAULT_MEDIA.to_vec()))
    }

    async fn send_message(
        &self,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let should_panic = {
            let mut armed = self.panic_on_text.write().await;
            if armed.as_deref() == Some(text) {
                armed.take().is_some()
            } else {
                false
            }
        };
        if should_panic {
            panic!("mock transport panic");
        }

        let handle = self.handle();
        self.record(TransportCall::SendMessage {
            target: *target,
            text: text.to_string(),
            handle,
        })
        .await;
        Ok(handle)
    }

    async fn edit_message(
        &self,
        target: &ReplyTarget,
        message: MessageHandle,
        text: &str,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::EditMessage {
            target: *target,
            message,
            text: text.to_string(),
        })
        .await;
        Ok(())
    }

    async fn delete_message(
        &self,
        target: &ReplyTarget,
        message: MessageHandle,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::DeleteMessage {
            target: *target,
            message,
        })
        .await;
        Ok(())
    }

    async fn send_video_note(
        &self,
        target: &ReplyTarget,
        note: Vec<u8>,
        side: u32,
    ) -> Result<MessageHandle, TransportError> {
        if take_failure(&self.delivery_failures).await {
            return Err(TransportError::ApiError("mock delivery failure".to_string()));
        }
        self.record(TransportCall::SendVideoNote {
            target: *target,
            size_bytes: note.len(),
            side,
        })
        .await;
        Ok(self.handle())
    }
}
