//! Configuration for the job pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pipeline behaviour settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retry policy for transport fetch and delivery.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry configuration. Applies to transport calls only, never to the
/// encoding tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first. `1` disables retrying.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// User-facing texts.
///
/// `{max_mib}` is replaced with the upload limit and `{reason}` with a short
/// failure summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub welcome: String,
    pub too_large: String,
    pub busy: String,
    pub starting: String,
    pub queued: String,
    pub processing: String,
    pub failure: String,
    pub follow_up: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            welcome: "👋 Hi! Send me a video up to {max_mib} MB and I'll turn it into a round video note.".into(),
            too_large: "❌ The file is too large (maximum {max_mib} MB).".into(),
            busy: "⏳ Too many videos are being processed right now. Please try again in a minute.".into(),
            starting: "📥 Starting...".into(),
            queued: "⏳ Waiting in line...".into(),
            processing: "🔄 One moment...".into(),
            failure: "⚠️ Processing failed: {reason}.".into(),
            follow_up: "🔗 Enjoy! Share the bot with your friends.".into(),
        }
    }
}

impl Messages {
    pub fn welcome(&self, max_mib: u64) -> String {
        self.welcome.replace("{max_mib}", &max_mib.to_string())
    }

    pub fn too_large(&self, max_mib: u64) -> String {
        self.too_large.replace("{max_mib}", &max_mib.to_string())
    }

    pub fn failure(&self, reason: &str) -> String {
        self.failure.replace("{reason}", reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults_to_single_attempt() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_placeholders() {
        let messages = Messages::default();
        assert!(messages.too_large(50).contains("50 MB"));
        assert!(messages.welcome(50).contains("50 MB"));
        assert!(messages
            .failure("the video could not be encoded")
            .contains("the video could not be encoded"));
    }

    #[test]
    fn test_partial_override() {
        let messages: Messages = toml::from_str(r#"busy = "Busy, try later""#).unwrap();
        assert_eq!(messages.busy, "Busy, try later");
        assert_eq!(messages.starting, Messages::default().starting);
    }
}
