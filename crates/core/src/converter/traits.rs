//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ConverterError;
use super::types::{NormalizeResult, PackResult, TransformParams};

/// Turns an arbitrary video into a duration-limited square clip.
#[async_trait]
pub trait MediaTransformer: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Trims, center-crops and (if needed) downscales `input` into `output`.
    ///
    /// `input` is never modified. On success exactly one new file exists at
    /// `output`.
    async fn normalize(
        &self,
        input: &Path,
        output: &Path,
        params: &TransformParams,
    ) -> Result<NormalizeResult, ConverterError>;
}

/// Encodes a square clip as a small video note for circular display.
#[async_trait]
pub trait NotePackager: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Packs `input` into a `note_side × note_side` clip at `output`.
    async fn pack(
        &self,
        input: &Path,
        output: &Path,
        params: &TransformParams,
    ) -> Result<PackResult, ConverterError>;
}
