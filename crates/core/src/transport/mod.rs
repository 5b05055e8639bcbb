//! Boundary to the messaging transport.
//!
//! The core never talks to a chat network directly. It receives
//! [`InboundEvent`]s and calls back through [`Transport`], which must be safe
//! to use from many jobs at once.

mod types;

pub use types::{
    ChatId, InboundEvent, MediaRef, MessageHandle, ReplyTarget, TransportError,
};

use async_trait::async_trait;

/// Bidirectional message channel shared by all jobs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the name of this transport.
    fn name(&self) -> &str;

    /// Downloads the bytes behind a media reference.
    async fn fetch_media(&self, media: &MediaRef) -> Result<Vec<u8>, TransportError>;

    /// Posts a text message.
    async fn send_message(
        &self,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<MessageHandle, TransportError>;

    /// Replaces the text of a message sent earlier.
    async fn edit_message(
        &self,
        target: &ReplyTarget,
        message: MessageHandle,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Deletes a message sent earlier.
    async fn delete_message(
        &self,
        target: &ReplyTarget,
        message: MessageHandle,
    ) -> Result<(), TransportError>;

    /// Posts a round video note of `side × side` pixels.
    async fn send_video_note(
        &self,
        target: &ReplyTarget,
        note: Vec<u8>,
        side: u32,
    ) -> Result<MessageHandle, TransportError>;
}
