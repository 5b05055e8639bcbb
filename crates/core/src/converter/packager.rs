//! Argument contract for the video note pass.

use std::path::Path;

use super::types::TransformParams;

/// Filter chain for the video note: square crop (a no-op on already square
/// input), scale to the note side, fixed pixel format.
pub fn note_filter_chain(params: &TransformParams) -> String {
    format!(
        "crop=min(iw\\,ih):min(iw\\,ih),scale={side}:{side},format={pix}",
        side = params.note_side,
        pix = params.pixel_format
    )
}

/// Full ffmpeg argument list for packing `input` into `output`.
pub fn note_args(
    input: &Path,
    output: &Path,
    params: &TransformParams,
    log_level: &str,
    extra_args: &[String],
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vf".to_string(),
        note_filter_chain(params),
    ];
    args.extend(params.note.to_ffmpeg_args());
    args.extend(["-loglevel".to_string(), log_level.to_string()]);
    args.extend(extra_args.iter().cloned());
    args.push(output.to_string_lossy().to_string());
    args
}
