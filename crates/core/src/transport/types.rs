//! Types exchanged with the messaging transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A conversation the bot can post into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message previously sent or received, addressable for edits and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub i64);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where replies for one request go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    /// Conversation the request came from.
    pub chat: ChatId,
    /// The inbound message that started the request, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message: Option<MessageHandle>,
}

impl ReplyTarget {
    /// Reply target for a chat with no specific source message.
    pub fn chat(chat: i64) -> Self {
        Self {
            chat: ChatId(chat),
            source_message: None,
        }
    }
}

/// Opaque transport reference to an uploaded media file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event pulled from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A message carrying a video to turn into a note.
    Video {
        media: MediaRef,
        declared_size_bytes: u64,
        reply_target: ReplyTarget,
    },
    /// A start or help command.
    Start { reply_target: ReplyTarget },
}

impl InboundEvent {
    /// Where replies for this event go.
    pub fn reply_target(&self) -> ReplyTarget {
        match self {
            Self::Video { reply_target, .. } | Self::Start { reply_target } => *reply_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_event_serialization() {
        let event = InboundEvent::Video {
            media: MediaRef::new("BAACAgIAAxkBAAIB"),
            declared_size_bytes: 1024,
            reply_target: ReplyTarget::chat(42),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "video");
        assert_eq!(json["declared_size_bytes"], 1024);
        assert_eq!(json["reply_target"]["chat"], 42);

        let parsed: InboundEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_reply_target_accessor() {
        let target = ReplyTarget {
            chat: ChatId(7),
            source_message: Some(MessageHandle(99)),
        };
        let event = InboundEvent::Start {
            reply_target: target,
        };
        assert_eq!(event.reply_target(), target);
    }
}
