//! Error types for the job pipeline.

use std::io;
use thiserror::Error;

use crate::converter::ConverterError;
use crate::transport::TransportError;
use crate::workspace::WorkspaceError;

/// Why a job stopped before completing.
#[derive(Debug, Error)]
pub enum JobError {
    /// Declared upload size is over the limit.
    #[error("declared size {declared_bytes} bytes exceeds limit of {max_bytes} bytes")]
    Validation { declared_bytes: u64, max_bytes: u64 },

    /// Admission refused because the dispatcher is saturated.
    #[error("too many jobs in flight")]
    Busy,

    /// Downloading the upload failed.
    #[error("fetch failed: {0}")]
    Fetch(#[source] TransportError),

    /// Sending the finished note failed.
    #[error("delivery failed: {0}")]
    Delivery(#[source] TransportError),

    /// Normalizing the upload failed.
    #[error("transform failed: {0}")]
    Transform(#[source] ConverterError),

    /// Packaging the note failed.
    #[error("packaging failed: {0}")]
    Package(#[source] ConverterError),

    /// No workspace could be allocated.
    #[error("workspace unavailable: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Reading or writing a temp file failed.
    #[error("local I/O failed: {0}")]
    Storage(#[from] io::Error),

    /// A stage panicked.
    #[error("job panicked: {0}")]
    Internal(String),

    /// A state change was attempted out of order.
    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl JobError {
    /// Whether this error means the job was never admitted.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Busy)
    }

    /// Stable reason recorded in the terminal job state.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "too large",
            Self::Busy => "busy",
            Self::Fetch(_) => "fetch error",
            Self::Delivery(_) => "delivery error",
            Self::Transform(e) | Self::Package(e) => converter_reason(e),
            Self::Workspace(_)
            | Self::Storage(_)
            | Self::Internal(_)
            | Self::InvalidTransition { .. } => "internal error",
        }
    }

    /// Short sentence safe to show the requester. Never contains paths or
    /// tool output.
    pub fn user_summary(&self) -> &'static str {
        match self.reason() {
            "too large" => "the file is too large",
            "busy" => "the bot is busy",
            "fetch error" => "could not download the video",
            "delivery error" => "could not send the video note",
            "decode error" => "the file could not be read as a video",
            "unsupported format" => "the file has no video track",
            "encoding tool error" => "the video could not be encoded",
            _ => "an internal error occurred",
        }
    }

    /// Captured tool diagnostics, for logs only.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Transform(ConverterError::EncodingTool { stderr_tail, .. })
            | Self::Package(ConverterError::EncodingTool { stderr_tail, .. }) => {
                Some(stderr_tail.as_str())
            }
            _ => None,
        }
    }
}

fn converter_reason(err: &ConverterError) -> &'static str {
    match err {
        ConverterError::Decode { .. } | ConverterError::ParseError { .. } => "decode error",
        ConverterError::UnsupportedFormat { .. } => "unsupported format",
        e if e.is_encoding_tool_failure() => "encoding tool error",
        _ => "internal error",
    }
}
