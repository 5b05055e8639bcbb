//! Geometry and duration planning for the normalize pass.
//!
//! Everything here is pure: the ffmpeg invocation in [`super::FfmpegConverter`]
//! only renders a [`NormalizePlan`] into arguments.

use serde::{Deserialize, Serialize};

use super::error::ConverterError;
use super::types::{CropRect, MediaInfo, TransformParams};

/// What the normalize pass will do to one particular input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizePlan {
    /// Centered square cut out of the source frame.
    pub crop: CropRect,
    /// Output side after an optional downscale.
    pub output_side: u32,
    /// Upper bound on the output duration. Always passed to ffmpeg, since
    /// not every container reports a duration.
    pub duration_cap_secs: u32,
    /// Set when the reported duration is known to exceed the cap.
    pub trim_to_secs: Option<u32>,
    /// Expected output duration in seconds; 0 when none was reported.
    pub output_duration_secs: f64,
}

impl NormalizePlan {
    /// Plans the transform for an inspected input.
    ///
    /// Fails with [`ConverterError::UnsupportedFormat`] when the input has no
    /// video stream with known dimensions.
    pub fn compute(info: &MediaInfo, params: &TransformParams) -> Result<Self, ConverterError> {
        let (width, height) = info
            .dimensions()
            .ok_or_else(|| ConverterError::unsupported("no video stream"))?;

        let crop = centered_square(width, height);
        let output_side = if crop.width > params.target_square_side {
            params.target_square_side
        } else {
            crop.width
        };

        let max = params.max_duration_secs;
        let trim_to_secs = (info.duration_secs > f64::from(max)).then_some(max);
        let output_duration_secs = match trim_to_secs {
            Some(limit) => f64::from(limit),
            None => info.duration_secs,
        };

        Ok(Self {
            crop,
            output_side,
            duration_cap_secs: max,
            trim_to_secs,
            output_duration_secs,
        })
    }

    /// Whether the crop needs a downscale to reach `output_side`.
    pub fn needs_scale(&self) -> bool {
        self.output_side != self.crop.width
    }

    /// The ffmpeg `-vf` filter chain for this plan.
    pub fn filter_chain(&self) -> String {
        let crop = format!(
            "crop={}:{}:{}:{}",
            self.crop.width, self.crop.height, self.crop.x, self.crop.y
        );
        if self.needs_scale() {
            format!("{},scale={}:{}", crop, self.output_side, self.output_side)
        } else {
            crop
        }
    }
}

/// Largest even-sided square centered on the frame center.
///
/// 4:2:0 encoders only accept even dimensions, so an odd shorter side is
/// rounded down by one pixel.
pub fn centered_square(width: u32, height: u32) -> CropRect {
    let min_side = width.min(height);
    let side = if min_side > 1 { min_side & !1 } else { min_side };
    CropRect {
        width: side,
        height: side,
        x: (width - side) / 2,
        y: (height - side) / 2,
    }
}
