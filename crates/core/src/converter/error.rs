//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while probing, normalizing or packaging media.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Input could not be opened as media.
    #[error("Failed to decode media: {reason}")]
    Decode { reason: String },

    /// Input is media but carries nothing we can turn into a video note.
    #[error("Unsupported media: {reason}")]
    UnsupportedFormat { reason: String },

    /// The encoding tool exited unsuccessfully.
    #[error("Encoding tool failed with exit code {exit_code:?}")]
    EncodingTool {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// The encoding tool exceeded its wall-clock budget and was killed.
    #[error("Encoding tool timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The encoding tool reported success but left no readable output.
    #[error("Output file not created: {path}")]
    OutputMissing { path: PathBuf },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse FFprobe output.
    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },
}

impl ConverterError {
    /// Creates a new decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Creates a new unsupported format error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            reason: reason.into(),
        }
    }

    /// Creates a new encoding tool error from an exit code and captured stderr.
    pub fn encoding_tool(exit_code: Option<i32>, stderr_tail: impl Into<String>) -> Self {
        Self::EncodingTool {
            exit_code,
            stderr_tail: stderr_tail.into(),
        }
    }

    /// Whether this error comes from the external tool itself (crash, timeout,
    /// missing binary, missing output) rather than from the input media.
    pub fn is_encoding_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::FfmpegNotFound { .. }
                | Self::FfprobeNotFound { .. }
                | Self::EncodingTool { .. }
                | Self::Timeout { .. }
                | Self::OutputMissing { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FfmpegNotFound { .. } | Self::FfprobeNotFound { .. } => "tool_missing",
            Self::InputNotFound { .. } => "input_missing",
            Self::Decode { .. } | Self::ParseError { .. } => "decode",
            Self::UnsupportedFormat { .. } => "unsupported",
            Self::EncodingTool { .. } => "exit_code",
            Self::Timeout { .. } => "timeout",
            Self::OutputMissing { .. } => "output_missing",
            Self::Io(_) => "io",
        }
    }
}
