//! Telegram Bot API payloads and their mapping to inbound events.

use serde::{Deserialize, Serialize};

use roundnote_core::transport::{ChatId, InboundEvent, MediaRef, MessageHandle, ReplyTarget};

/// Envelope around every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub video: Option<Video>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Result of `getFile`.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Result of `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct EditMessageText<'a> {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessage {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct GetFile<'a> {
    pub file_id: &'a str,
}

impl Message {
    fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            chat: ChatId(self.chat.id),
            source_message: Some(MessageHandle(self.message_id)),
        }
    }

    /// Maps a message to an inbound event, if it is one the bot handles.
    pub fn to_event(&self) -> Option<InboundEvent> {
        if let Some(video) = &self.video {
            return Some(InboundEvent::Video {
                media: MediaRef::new(video.file_id.clone()),
                declared_size_bytes: video.file_size.unwrap_or(0),
                reply_target: self.reply_target(),
            });
        }

        let command = self.text.as_deref()?.split_whitespace().next()?;
        // Commands may be addressed as `/start@SomeBot`.
        let command = command.split('@').next().unwrap_or(command);
        match command {
            "/start" | "/help" => Some(InboundEvent::Start {
                reply_target: self.reply_target(),
            }),
            _ => None,
        }
    }
}

impl Update {
    pub fn to_event(&self) -> Option<InboundEvent> {
        self.message.as_ref().and_then(Message::to_event)
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match &self.message {
            Some(message) if message.video.is_some() => "video",
            Some(message) if message.text.is_some() => "text",
            Some(_) => "other_message",
            None => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_video_update_maps_to_video_event() {
        let update = parse(
            r#"{
                "update_id": 100,
                "message": {
                    "message_id": 7,
                    "chat": {"id": -42, "type": "private"},
                    "video": {
                        "file_id": "BAACAgIAAxkBAAIB",
                        "file_unique_id": "AgADxx",
                        "file_size": 10485760,
                        "duration": 30,
                        "width": 1920,
                        "height": 1080
                    }
                }
            }"#,
        );

        let event = update.to_event().unwrap();
        assert_eq!(
            event,
            InboundEvent::Video {
                media: MediaRef::new("BAACAgIAAxkBAAIB"),
                declared_size_bytes: 10 * 1024 * 1024,
                reply_target: ReplyTarget {
                    chat: ChatId(-42),
                    source_message: Some(MessageHandle(7)),
                },
            }
        );
        assert_eq!(update.kind(), "video");
    }

    #[test]
    fn test_start_and_help_commands() {
        for text in ["/start", "/help", "/start@roundnote_bot", "/start payload"] {
            let update = parse(&format!(
                r#"{{"update_id": 1, "message": {{"message_id": 1, "chat": {{"id": 5}}, "text": "{}"}}}}"#,
                text
            ));
            assert!(
                matches!(update.to_event(), Some(InboundEvent::Start { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn test_other_messages_ignored() {
        let text = parse(
            r#"{"update_id": 2, "message": {"message_id": 2, "chat": {"id": 5}, "text": "hello"}}"#,
        );
        assert!(text.to_event().is_none());

        let photo = parse(
            r#"{"update_id": 3, "message": {"message_id": 3, "chat": {"id": 5}, "photo": []}}"#,
        );
        assert!(photo.to_event().is_none());
        assert_eq!(photo.kind(), "other_message");

        let callback = parse(r#"{"update_id": 4, "callback_query": {"id": "x"}}"#);
        assert!(callback.to_event().is_none());
    }

    #[test]
    fn test_error_response_envelope() {
        let response: ApiResponse<Message> = serde_json::from_str(
            r#"{"ok": false, "error_code": 400, "description": "Bad Request: message to delete not found"}"#,
        )
        .unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert_eq!(response.error_code, Some(400));
    }
}
