//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the transport, converter and
//! workspace file system seams, so whole jobs can run without a chat network
//! or ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use roundnote_core::testing::{fixtures, MockConverter, MockTransport};
//!
//! let transport = Arc::new(MockTransport::new());
//! let converter = Arc::new(MockConverter::new());
//!
//! // Configure failures
//! transport.fail_next_fetches(1).await;
//!
//! let outcome = pipeline.run(fixtures::video_job("file-1", fixtures::MIB)).await;
//! ```

mod memory_fs;
mod mock_converter;
mod mock_transport;

pub use memory_fs::MemoryFs;
pub use mock_converter::{MockConverter, MockStage, RecordedStage};
pub use mock_transport::{MockTransport, TransportCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::pipeline::Job;
    use crate::transport::{InboundEvent, MediaRef, MessageHandle, ReplyTarget};

    /// One mebibyte.
    pub const MIB: u64 = 1024 * 1024;

    /// Reply target for a chat, with a source message id.
    pub fn reply_target(chat: i64) -> ReplyTarget {
        ReplyTarget {
            chat: crate::transport::ChatId(chat),
            source_message: Some(MessageHandle(chat * 10)),
        }
    }

    /// Create a fresh job for `media` declaring `size_bytes`.
    pub fn video_job(media: &str, size_bytes: u64) -> Job {
        Job::new(MediaRef::new(media), size_bytes, reply_target(1))
    }

    /// Create an inbound video event.
    pub fn video_event(media: &str, size_bytes: u64, chat: i64) -> InboundEvent {
        InboundEvent::Video {
            media: MediaRef::new(media),
            declared_size_bytes: size_bytes,
            reply_target: reply_target(chat),
        }
    }

    /// Create an inbound start command.
    pub fn start_event(chat: i64) -> InboundEvent {
        InboundEvent::Start {
            reply_target: reply_target(chat),
        }
    }
}
