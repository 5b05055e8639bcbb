//! Converter module: turns an uploaded video into a video note.
//!
//! Two passes, each behind its own trait so the pipeline can be tested
//! without ffmpeg:
//!
//! - [`MediaTransformer::normalize`]: prefix-trim to the duration limit,
//!   centered square crop, downscale to the target side if larger.
//! - [`NotePackager::pack`]: square safeguard crop, scale to the note side,
//!   fixed pixel format, compact encode.
//!
//! [`FfmpegConverter`] implements both by shelling out to ffprobe/ffmpeg with
//! a wall-clock timeout per invocation.
//!
//! # Example
//!
//! ```ignore
//! use roundnote_core::converter::{FfmpegConverter, MediaTransformer, NotePackager, TransformParams};
//!
//! let converter = FfmpegConverter::with_defaults();
//! converter.validate().await?;
//!
//! let params = TransformParams::default();
//! let normalized = converter.normalize(&input, &clip, &params).await?;
//! println!("normalized to {}x{}", normalized.side, normalized.side);
//!
//! let note = converter.pack(&clip, &output, &params).await?;
//! println!("video note is {} bytes", note.output_size_bytes);
//! ```

mod config;
mod error;
mod ffmpeg;
mod packager;
mod traits;
mod transform;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use packager::{note_args, note_filter_chain};
pub use traits::{MediaTransformer, NotePackager};
pub use transform::{centered_square, NormalizePlan};
pub use types::{CropRect, EncodeSettings, MediaInfo, NormalizeResult, PackResult, TransformParams};
