//! Telegram Bot API transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::debug;

use roundnote_core::config::TelegramConfig;
use roundnote_core::transport::{MediaRef, MessageHandle, ReplyTarget, Transport, TransportError};

use crate::metrics;

use super::types::{
    ApiResponse, DeleteMessage, EditMessageText, File, GetFile, GetUpdates, Message, SendMessage,
    Update, User,
};

/// Extra time on top of the long-poll timeout before a `getUpdates` request
/// is considered dead.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Bot API client implementing [`Transport`].
pub struct TelegramTransport {
    client: Client,
    config: TelegramConfig,
}

impl TelegramTransport {
    /// Create a new Telegram transport.
    pub fn new(config: TelegramConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url(), self.config.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url(), self.config.token, file_path)
    }

    /// Checks the token and returns the bot's own account.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TransportError> {
        let body = GetUpdates {
            offset,
            timeout: self.config.poll_timeout_secs,
            allowed_updates: vec!["message"],
        };
        let request = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&body)
            .timeout(Duration::from_secs(self.config.poll_timeout_secs) + POLL_GRACE);
        self.execute("getUpdates", request).await
    }

    async fn call<B, T>(&self, method: &'static str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.method_url(method)).json(body);
        self.execute(method, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        let start = Instant::now();
        let result = Self::send(request).await;

        metrics::TELEGRAM_REQUEST_DURATION
            .with_label_values(&[method])
            .observe(start.elapsed().as_secs_f64());
        metrics::TELEGRAM_REQUESTS_TOTAL
            .with_label_values(&[method, if result.is_ok() { "ok" } else { "error" }])
            .inc();

        result
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TransportError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            TransportError::InvalidResponse(format!("HTTP {}: {}", status, e.without_url()))
        })?;

        if !body.ok {
            return Err(TransportError::ApiError(format!(
                "{} ({})",
                body.description.unwrap_or_else(|| "unknown error".to_string()),
                body.error_code.unwrap_or(status.as_u16() as i32)
            )));
        }

        body.result
            .ok_or_else(|| TransportError::InvalidResponse("missing result".to_string()))
    }
}

/// Maps a reqwest error without leaking the URL, which carries the token.
fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    let e = e.without_url();
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::ConnectionFailed(e.to_string())
    } else {
        TransportError::ApiError(e.to_string())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn fetch_media(&self, media: &MediaRef) -> Result<Vec<u8>, TransportError> {
        let file: File = self
            .call(
                "getFile",
                &GetFile {
                    file_id: media.as_str(),
                },
            )
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| TransportError::MediaNotFound(file.file_id.clone()))?;

        let start = Instant::now();
        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(TransportError::MediaNotFound(file_path));
        }
        if !status.is_success() {
            return Err(TransportError::ApiError(format!("HTTP {}", status)));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        metrics::TELEGRAM_REQUEST_DURATION
            .with_label_values(&["download"])
            .observe(start.elapsed().as_secs_f64());
        debug!(bytes = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }

    async fn send_message(
        &self,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let message: Message = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id: target.chat.0,
                    text,
                },
            )
            .await?;
        Ok(MessageHandle(message.message_id))
    }

    async fn edit_message(
        &self,
        target: &ReplyTarget,
        message: MessageHandle,
        text: &str,
    ) -> Result<(), TransportError> {
        let _: IgnoredAny = self
            .call(
                "editMessageText",
                &EditMessageText {
                    chat_id: target.chat.0,
                    message_id: message.0,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        target: &ReplyTarget,
        message: MessageHandle,
    ) -> Result<(), TransportError> {
        let _: IgnoredAny = self
            .call(
                "deleteMessage",
                &DeleteMessage {
                    chat_id: target.chat.0,
                    message_id: message.0,
                },
            )
            .await?;
        Ok(())
    }

    async fn send_video_note(
        &self,
        target: &ReplyTarget,
        note: Vec<u8>,
        side: u32,
    ) -> Result<MessageHandle, TransportError> {
        let part = multipart::Part::bytes(note)
            .file_name("note.mp4")
            .mime_str("video/mp4")
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        let form = multipart::Form::new()
            .text("chat_id", target.chat.0.to_string())
            .text("length", side.to_string())
            .part("video_note", part);

        let request = self
            .client
            .post(self.method_url("sendVideoNote"))
            .multipart(form);
        let message: Message = self.execute("sendVideoNote", request).await?;
        Ok(MessageHandle(message.message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(api_url: &str) -> TelegramTransport {
        TelegramTransport::new(TelegramConfig {
            token: "123:SECRET".to_string(),
            api_url: api_url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let t = transport("https://api.telegram.org/");
        assert_eq!(
            t.method_url("getMe"),
            "https://api.telegram.org/bot123:SECRET/getMe"
        );
        assert_eq!(
            t.file_url("videos/file_1.mp4"),
            "https://api.telegram.org/file/bot123:SECRET/videos/file_1.mp4"
        );
    }

    #[tokio::test]
    async fn test_connection_error_hides_token() {
        // Nothing listens on port 9 of localhost.
        let t = transport("http://127.0.0.1:9");
        let err = t
            .send_message(&ReplyTarget::chat(1), "hi")
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("SECRET"), "{}", err);
    }
}
