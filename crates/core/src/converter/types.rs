//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Encoder settings for one ffmpeg pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    /// FFmpeg video encoder name.
    pub video_codec: String,
    /// Target video bitrate in kbps (encoder default when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate_kbps: Option<u32>,
    /// Encoder preset.
    pub preset: String,
    /// FFmpeg audio encoder name.
    pub audio_codec: String,
    /// Target audio bitrate in kbps (encoder default when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<u32>,
    /// Encoder thread count (ffmpeg chooses when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
}

impl EncodeSettings {
    /// Settings for the normalize pass: x264/aac at encoder-default bitrates.
    pub fn normalize_default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            video_bitrate_kbps: None,
            preset: "fast".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: None,
            threads: Some(4),
        }
    }

    /// Settings for the video note pass.
    pub fn note_default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            video_bitrate_kbps: Some(500),
            preset: "fast".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: Some(128),
            threads: None,
        }
    }

    /// Renders these settings as ffmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.video_codec.clone()];
        if let Some(bitrate) = self.video_bitrate_kbps {
            args.extend(["-b:v".to_string(), format!("{}k", bitrate)]);
        }
        args.extend(["-preset".to_string(), self.preset.clone()]);
        args.extend(["-c:a".to_string(), self.audio_codec.clone()]);
        if let Some(bitrate) = self.audio_bitrate_kbps {
            args.extend(["-b:a".to_string(), format!("{}k", bitrate)]);
        }
        if let Some(threads) = self.threads {
            args.extend(["-threads".to_string(), threads.to_string()]);
        }
        args
    }
}

/// Limits and encoder settings that shape every job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformParams {
    /// Largest accepted upload, checked against the declared size before fetch.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,

    /// Clips longer than this are cut to their first `max_duration_secs`.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u32,

    /// Squares larger than this are downscaled to exactly this side.
    #[serde(default = "default_target_square_side")]
    pub target_square_side: u32,

    /// Side of the final video note.
    #[serde(default = "default_note_side")]
    pub note_side: u32,

    /// Pixel format forced on the video note.
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Encoder settings for the normalize pass.
    #[serde(default = "EncodeSettings::normalize_default")]
    pub normalize: EncodeSettings,

    /// Encoder settings for the video note pass.
    #[serde(default = "EncodeSettings::note_default")]
    pub note: EncodeSettings,
}

fn default_max_input_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_duration_secs() -> u32 {
    60
}

fn default_target_square_side() -> u32 {
    640
}

fn default_note_side() -> u32 {
    256
}

fn default_pixel_format() -> String {
    "yuv420p".to_string()
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            max_duration_secs: default_max_duration_secs(),
            target_square_side: default_target_square_side(),
            note_side: default_note_side(),
            pixel_format: default_pixel_format(),
            normalize: EncodeSettings::normalize_default(),
            note: EncodeSettings::note_default(),
        }
    }
}

impl TransformParams {
    /// Whole mebibytes allowed, for user-facing messages.
    pub fn max_input_mib(&self) -> u64 {
        self.max_input_bytes / (1024 * 1024)
    }
}

/// Information about a media file, as reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Path to the file.
    pub path: PathBuf,
    /// Duration in seconds (0 when the container does not say).
    pub duration_secs: f64,
    /// Container format name.
    pub format: String,
    /// Video codec, if a video stream exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Frame width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Frame height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Audio codec, if an audio stream exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    /// Frame dimensions, when a video stream with a known size exists.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Whether the file carries an audio stream.
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

/// A rectangle cut out of the source frame, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Result of the normalize pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeResult {
    /// Where the normalized clip was written.
    pub output_path: PathBuf,
    /// Side of the square output in pixels.
    pub side: u32,
    /// Duration of the output in seconds.
    pub duration_secs: f64,
    /// Whether the source was cut to the duration limit.
    pub trimmed: bool,
    /// Output size in bytes.
    pub output_size_bytes: u64,
    /// Wall-clock time spent in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of the video note pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackResult {
    /// Where the video note was written.
    pub output_path: PathBuf,
    /// Side of the video note in pixels.
    pub side: u32,
    /// Output size in bytes.
    pub output_size_bytes: u64,
    /// Wall-clock time spent in milliseconds.
    pub elapsed_ms: u64,
}
