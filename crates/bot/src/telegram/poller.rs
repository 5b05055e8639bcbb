//! Long-polling loop feeding inbound events to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use roundnote_core::transport::{InboundEvent, TransportError};

use crate::metrics;

use super::client::TelegramTransport;
use super::types::Update;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Anything that can be long-polled for updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TransportError>;
}

#[async_trait]
impl UpdateSource for TelegramTransport {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TransportError> {
        TelegramTransport::get_updates(self, offset).await
    }
}

#[async_trait]
impl<T: UpdateSource + ?Sized> UpdateSource for Arc<T> {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TransportError> {
        (**self).get_updates(offset).await
    }
}

/// Polls for updates and forwards handled ones as [`InboundEvent`]s.
pub struct Poller<S> {
    source: S,
    events: mpsc::Sender<InboundEvent>,
    shutdown: watch::Receiver<bool>,
    offset: Option<i64>,
}

impl<S: UpdateSource> Poller<S> {
    pub fn new(
        source: S,
        events: mpsc::Sender<InboundEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            events,
            shutdown,
            offset: None,
        }
    }

    /// Runs until shutdown is signalled or the event channel closes.
    pub async fn run(mut self) {
        info!("Polling for updates");
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.source.get_updates(self.offset) => result,
                _ = self.shutdown.changed() => break,
            };

            match result {
                Ok(updates) => {
                    backoff = INITIAL_BACKOFF;
                    if !self.forward(updates).await {
                        debug!("Event channel closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, retry_in_secs = backoff.as_secs(), "getUpdates failed");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.shutdown.changed() => break,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        info!("Poller stopped");
    }

    /// Forwards a batch, advancing the offset past every update seen.
    ///
    /// Returns `false` once the receiving side is gone.
    async fn forward(&mut self, updates: Vec<Update>) -> bool {
        for update in updates {
            self.offset = Some(update.update_id + 1);
            metrics::UPDATES_TOTAL
                .with_label_values(&[update.kind()])
                .inc();

            let Some(event) = update.to_event() else {
                continue;
            };
            if self.events.send(event).await.is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays scripted responses, then blocks like an idle long poll.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        responses: Arc<Mutex<VecDeque<Result<Vec<Update>, TransportError>>>>,
        offsets: Arc<Mutex<Vec<Option<i64>>>>,
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TransportError> {
            self.offsets.lock().await.push(offset);
            let next = self.responses.lock().await.pop_front();
            match next {
                Some(response) => response,
                None => std::future::pending().await,
            }
        }
    }

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_events_and_advances_offset() {
        let source = ScriptedSource::default();
        source.responses.lock().await.extend([
            Ok(vec![
                update(r#"{"update_id": 10, "message": {"message_id": 1, "chat": {"id": 5}, "text": "/start"}}"#),
                update(r#"{"update_id": 11, "message": {"message_id": 2, "chat": {"id": 5}, "text": "hi"}}"#),
            ]),
            Ok(vec![update(
                r#"{"update_id": 12, "message": {"message_id": 3, "chat": {"id": 5}, "video": {"file_id": "f", "file_size": 10}}}"#,
            )]),
        ]);

        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = tokio::spawn(Poller::new(source.clone(), tx, shutdown_rx).run());

        assert!(matches!(rx.recv().await, Some(InboundEvent::Start { .. })));
        assert!(matches!(rx.recv().await, Some(InboundEvent::Video { .. })));

        shutdown_tx.send(true).unwrap();
        poller.await.unwrap();

        let offsets = source.offsets.lock().await.clone();
        assert!(offsets.starts_with(&[None, Some(12)]), "{:?}", offsets);
        assert!(offsets.iter().skip(2).all(|offset| *offset == Some(13)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backs_off_after_errors() {
        let source = ScriptedSource::default();
        source.responses.lock().await.extend([
            Err(TransportError::Timeout),
            Ok(vec![update(
                r#"{"update_id": 1, "message": {"message_id": 1, "chat": {"id": 5}, "text": "/help"}}"#,
            )]),
        ]);

        let (tx, mut rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(Poller::new(source.clone(), tx, shutdown_rx).run());

        assert!(matches!(rx.recv().await, Some(InboundEvent::Start { .. })));
        assert_eq!(source.offsets.lock().await[..2], [None, None]);
    }

    #[tokio::test]
    async fn test_stops_when_channel_closed() {
        let source = ScriptedSource::default();
        source.responses.lock().await.push_back(Ok(vec![update(
            r#"{"update_id": 1, "message": {"message_id": 1, "chat": {"id": 5}, "text": "/start"}}"#,
        )]));

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio_test::assert_ok!(
            tokio::time::timeout(
                Duration::from_secs(5),
                Poller::new(source, tx, shutdown_rx).run()
            )
            .await
        );
    }
}
