use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::converter::{ConverterConfig, TransformParams};
use crate::dispatcher::DispatcherConfig;
use crate::pipeline::{Messages, PipelineConfig};
use crate::workspace::WorkspaceConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub transform: TransformParams,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub messages: Messages,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    /// Bot token. Usually supplied through the `TOKEN` environment variable.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Timeout for every other API request, including uploads.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    60
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Sanitized config for startup logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub telegram: SanitizedTelegramConfig,
    pub converter: ConverterConfig,
    pub transform: TransformParams,
    pub workspace: WorkspaceConfig,
    pub dispatcher: DispatcherConfig,
    pub pipeline: PipelineConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Sanitized Telegram config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTelegramConfig {
    pub api_url: String,
    pub token_configured: bool,
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            telegram: SanitizedTelegramConfig {
                api_url: config.telegram.api_url.clone(),
                token_configured: !config.telegram.token.is_empty(),
                poll_timeout_secs: config.telegram.poll_timeout_secs,
                request_timeout_secs: config.telegram.request_timeout_secs,
            },
            converter: config.converter.clone(),
            transform: config.transform.clone(),
            workspace: config.workspace.clone(),
            dispatcher: config.dispatcher.clone(),
            pipeline: config.pipeline.clone(),
            metrics: config.metrics.clone(),
            logging: config.logging.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::OverflowPolicy;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[telegram]
token = "123:abc"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.dispatcher.max_concurrent_jobs, 4);
        assert_eq!(config.transform.max_input_bytes, 50 * 1024 * 1024);
        assert_eq!(config.pipeline.retry.max_attempts, 1);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_deserialize_full_sections() {
        let toml = r#"
[telegram]
token = "123:abc"
poll_timeout_secs = 10

[converter]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
timeout_secs = 120

[transform]
max_duration_secs = 30
note_side = 384

[dispatcher]
max_concurrent_jobs = 2
overflow = "reject"

[messages]
busy = "Busy!"

[metrics]
enabled = true
listen = "0.0.0.0:9100"

[logging]
json = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.telegram.poll_timeout_secs, 10);
        assert_eq!(config.converter.timeout_secs, 120);
        assert_eq!(config.transform.max_duration_secs, 30);
        assert_eq!(config.transform.note_side, 384);
        assert_eq!(config.transform.target_square_side, 640);
        assert_eq!(config.dispatcher.overflow, OverflowPolicy::Reject);
        assert_eq!(config.messages.busy, "Busy!");
        assert_eq!(config.metrics.listen.port(), 9100);
        assert!(config.logging.json);
    }

    #[test]
    fn test_sanitized_config_hides_token() {
        let mut config = Config::default();
        config.telegram.token = "123456:SECRET".to_string();

        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("SECRET"));
        assert!(sanitized.telegram.token_configured);
    }
}
