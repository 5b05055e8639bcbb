//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::packager::note_args;
use super::traits::{MediaTransformer, NotePackager};
use super::transform::NormalizePlan;
use super::types::{MediaInfo, NormalizeResult, PackResult, TransformParams};

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// FFmpeg-based converter implementation.
///
/// Implements both [`MediaTransformer`] (ffprobe + one ffmpeg pass) and
/// [`NotePackager`] (one ffmpeg pass).
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Reads stream and container info of a media file with ffprobe.
    pub async fn inspect(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let child = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = timeout(self.timeout(), child.wait_with_output())
            .await
            .map_err(|_| ConverterError::Timeout {
                timeout_secs: self.config.timeout_secs,
            })??;

        if !output.status.success() {
            return Err(ConverterError::decode(format!(
                "ffprobe exited with code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_media_info(path, &stdout)
    }

    /// Checks that ffmpeg and ffprobe can be executed.
    pub async fn validate(&self) -> Result<(), ConverterError> {
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Builds ffmpeg arguments for the normalize pass.
    fn build_normalize_args(
        &self,
        input: &Path,
        output: &Path,
        plan: &NormalizePlan,
        params: &TransformParams,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        // A prefix cap is a no-op on shorter clips.
        args.extend(["-t".to_string(), plan.duration_cap_secs.to_string()]);

        args.extend(["-vf".to_string(), plan.filter_chain()]);
        args.extend(params.normalize.to_ffmpeg_args());
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
        ]);
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_media_info(path: &Path, output: &str) -> Result<MediaInfo, ConverterError> {
        #[derive(Deserialize)]
        struct RawOutput {
            format: RawFormat,
            #[serde(default)]
            streams: Vec<RawStream>,
        }

        #[derive(Deserialize)]
        struct RawFormat {
            format_name: String,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct RawStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            duration: Option<String>,
        }

        let raw: RawOutput =
            serde_json::from_str(output).map_err(|e| ConverterError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let video_stream = raw.streams.iter().find(|s| s.codec_type == "video");
        let audio_stream = raw.streams.iter().find(|s| s.codec_type == "audio");

        // Some containers only report duration on the stream.
        let duration_secs = raw
            .format
            .duration
            .as_ref()
            .or_else(|| video_stream.and_then(|s| s.duration.as_ref()))
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let format_name = raw
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration_secs,
            format: format_name.to_string(),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            width: video_stream.and_then(|s| s.width),
            height: video_stream.and_then(|s| s.height),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
        })
    }

    /// Runs ffmpeg to completion under the configured timeout.
    ///
    /// Returns the last stderr lines on a non-zero exit. The child is killed
    /// on timeout and on any early return.
    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), ConverterError> {
        debug!(ffmpeg = ?self.config.ffmpeg_path, ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("ffmpeg stderr was not captured"))?;
        let mut reader = BufReader::new(stderr);

        let result = timeout(self.timeout(), async {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut line = Vec::new();
            // Drain to EOF so the child never blocks on a full pipe. ffmpeg may
            // echo non-UTF-8 metadata, hence the lossy decode.
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        let text = String::from_utf8_lossy(&line);
                        tail.push_back(text.trim_end_matches(['\r', '\n']).to_string());
                    }
                    Err(e) => {
                        debug!(error = %e, "Stopped reading ffmpeg stderr");
                        break;
                    }
                }
            }

            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, tail))
        })
        .await;

        match result {
            Ok(Ok((status, tail))) => {
                if status.success() {
                    Ok(())
                } else {
                    let tail: Vec<String> = tail.into_iter().collect();
                    Err(ConverterError::encoding_tool(status.code(), tail.join("\n")))
                }
            }
            Ok(Err(e)) => Err(ConverterError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(ConverterError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        }
    }

    /// Size of a freshly written output, or `OutputMissing`.
    async fn output_size(path: &Path) -> Result<u64, ConverterError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(ConverterError::OutputMissing {
                path: path.to_path_buf(),
            }),
        }
    }
}

#[async_trait]
impl MediaTransformer for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn normalize(
        &self,
        input: &Path,
        output: &Path,
        params: &TransformParams,
    ) -> Result<NormalizeResult, ConverterError> {
        let start = Instant::now();

        let info = self.inspect(input).await?;
        let plan = NormalizePlan::compute(&info, params)?;
        debug!(
            width = ?info.width,
            height = ?info.height,
            duration_secs = info.duration_secs,
            has_audio = info.has_audio(),
            output_side = plan.output_side,
            trim_to_secs = ?plan.trim_to_secs,
            "Planned normalize pass"
        );

        let args = self.build_normalize_args(input, output, &plan, params);
        self.run_ffmpeg(&args).await?;

        let output_size_bytes = Self::output_size(output).await?;

        Ok(NormalizeResult {
            output_path: output.to_path_buf(),
            side: plan.output_side,
            duration_secs: plan.output_duration_secs,
            trimmed: plan.trim_to_secs.is_some(),
            output_size_bytes,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl NotePackager for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn pack(
        &self,
        input: &Path,
        output: &Path,
        params: &TransformParams,
    ) -> Result<PackResult, ConverterError> {
        let start = Instant::now();

        let args = note_args(
            input,
            output,
            params,
            &self.config.ffmpeg_log_level,
            &self.config.extra_ffmpeg_args,
        );
        self.run_ffmpeg(&args).await?;

        let output_size_bytes = Self::output_size(output).await?;

        Ok(PackResult {
            output_path: output.to_path_buf(),
            side: params.note_side,
            output_size_bytes,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info(width: u32, height: u32, duration_secs: f64) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("/input.mp4"),
            duration_secs,
            format: "mov".to_string(),
            video_codec: Some("h264".to_string()),
            width: Some(width),
            height: Some(height),
            audio_codec: Some("aac".to_string()),
        }
    }

    #[test]
    fn test_build_normalize_args_with_trim_and_scale() {
        let converter = FfmpegConverter::with_defaults();
        let params = TransformParams::default();
        let plan = NormalizePlan::compute(&info(1920, 1080, 90.0), &params).unwrap();

        let args = converter.build_normalize_args(
            Path::new("/work/input.mp4"),
            Path::new("/work/normalized.mp4"),
            &plan,
            &params,
        );

        assert_eq!(&args[..3], &["-y", "-i", "/work/input.mp4"]);
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "60"));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-vf" && w[1] == "crop=1080:1080:420:0,scale=640:640"));
        assert!(args.windows(2).any(|w| w[0] == "-preset" && w[1] == "fast"));
        assert_eq!(args.last().unwrap(), "/work/normalized.mp4");
    }

    #[test]
    fn test_build_normalize_args_short_clip() {
        let converter = FfmpegConverter::with_defaults();
        let params = TransformParams::default();
        let plan = NormalizePlan::compute(&info(100, 200, 5.0), &params).unwrap();

        let args = converter.build_normalize_args(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            &plan,
            &params,
        );

        assert_eq!(plan.trim_to_secs, None);
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "60"));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-vf" && w[1] == "crop=100:100:0:50"));
    }

    #[test]
    fn test_parse_media_info_video() {
        let json = r#"{
            "format": {
                "filename": "clip.mp4",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "30.033",
                "size": "10485760"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30/1"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "sample_rate": "48000",
                    "channels": 2
                }
            ]
        }"#;

        let info = FfmpegConverter::parse_media_info(Path::new("clip.mp4"), json).unwrap();
        assert_eq!(info.format, "mov");
        assert!((info.duration_secs - 30.033).abs() < 0.001);
        assert_eq!(info.dimensions(), Some((1920, 1080)));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
    }

    #[test]
    fn test_parse_media_info_audio_only() {
        let json = r#"{
            "format": { "format_name": "mp3", "duration": "180.0" },
            "streams": [ { "codec_type": "audio", "codec_name": "mp3" } ]
        }"#;

        let info = FfmpegConverter::parse_media_info(Path::new("song.mp3"), json).unwrap();
        assert_eq!(info.dimensions(), None);
        let err = NormalizePlan::compute(&info, &TransformParams::default()).unwrap_err();
        assert!(matches!(err, ConverterError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_parse_media_info_stream_duration_fallback() {
        let json = r#"{
            "format": { "format_name": "matroska,webm" },
            "streams": [
                { "codec_type": "video", "codec_name": "vp9", "width": 720, "height": 1280, "duration": "95.5" }
            ]
        }"#;

        let info = FfmpegConverter::parse_media_info(Path::new("clip.webm"), json).unwrap();
        assert_eq!(info.format, "matroska");
        assert!((info.duration_secs - 95.5).abs() < 0.001);
    }

    #[test]
    fn test_missing_duration_is_still_capped() {
        let json = r#"{
            "format": { "format_name": "matroska,webm" },
            "streams": [
                { "codec_type": "video", "codec_name": "vp9", "width": 1280, "height": 720 }
            ]
        }"#;

        let info = FfmpegConverter::parse_media_info(Path::new("in.webm"), json).unwrap();
        assert_eq!(info.duration_secs, 0.0);

        let converter = FfmpegConverter::with_defaults();
        let params = TransformParams::default();
        let plan = NormalizePlan::compute(&info, &params).unwrap();
        let args = converter.build_normalize_args(
            Path::new("in.webm"),
            Path::new("out.mp4"),
            &plan,
            &params,
        );

        assert!(
            args.windows(2).any(|w| w[0] == "-t" && w[1] == "60"),
            "missing duration cap: {:?}",
            args
        );
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-vf" && w[1] == "crop=720:720:280:0,scale=640:640"));
    }

    #[test]
    fn test_parse_media_info_garbage() {
        let err = FfmpegConverter::parse_media_info(Path::new("x"), "not json").unwrap_err();
        assert!(matches!(err, ConverterError::ParseError { .. }));
    }

    #[tokio::test]
    async fn test_inspect_missing_input() {
        let converter = FfmpegConverter::with_defaults();
        let err = converter
            .inspect(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_binary() {
        let converter = FfmpegConverter::new(ConverterConfig::with_paths(
            PathBuf::from("/nonexistent/ffmpeg"),
            PathBuf::from("/nonexistent/ffprobe"),
        ));
        let err = converter.validate().await.unwrap_err();
        assert!(matches!(err, ConverterError::FfmpegNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr_tail() {
        // `sh -c` stands in for ffmpeg: it ignores the ffmpeg-style args.
        let converter = FfmpegConverter::new(ConverterConfig::with_paths(
            PathBuf::from("sh"),
            PathBuf::from("ffprobe"),
        ));
        let args = vec![
            "-c".to_string(),
            "echo first >&2; echo 'Invalid data found' >&2; exit 1".to_string(),
        ];

        let err = converter.run_ffmpeg(&args).await.unwrap_err();
        match err {
            ConverterError::EncodingTool {
                exit_code,
                stderr_tail,
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr_tail.ends_with("Invalid data found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_stderr_is_drained_to_the_end() {
        // Enough output after the invalid bytes to fill a pipe buffer.
        let converter = FfmpegConverter::new(
            ConverterConfig::with_paths(PathBuf::from("sh"), PathBuf::from("ffprobe"))
                .with_timeout(20),
        );
        let script = r#"printf 'title: \377\376 broken\n' >&2
i=0
while [ $i -lt 3000 ]; do
  echo 'frame=  100 fps=25 q=28.0 size=    256kB time=00:00:04.00' >&2
  i=$((i+1))
done
echo 'Conversion failed!' >&2
exit 1"#;
        let args = vec!["-c".to_string(), script.to_string()];

        let start = Instant::now();
        let err = converter.run_ffmpeg(&args).await.unwrap_err();
        match err {
            ConverterError::EncodingTool {
                exit_code,
                stderr_tail,
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr_tail.ends_with("Conversion failed!"));
                assert_eq!(stderr_tail.lines().count(), STDERR_TAIL_LINES);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(start.elapsed() < Duration::from_secs(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_tool_is_killed_on_timeout() {
        let converter = FfmpegConverter::new(
            ConverterConfig::with_paths(PathBuf::from("sh"), PathBuf::from("ffprobe"))
                .with_timeout(1),
        );
        let args = vec!["-c".to_string(), "sleep 30".to_string()];

        let start = Instant::now();
        let err = converter.run_ffmpeg(&args).await.unwrap_err();
        assert!(matches!(err, ConverterError::Timeout { timeout_secs: 1 }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe on PATH"]
    async fn test_real_ffmpeg_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        let normalized = dir.path().join("normalized.mp4");
        let note = dir.path().join("note.mp4");

        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-f", "lavfi", "-i", "testsrc=size=1280x720:rate=25", "-t", "3"])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let converter = FfmpegConverter::with_defaults();
        let params = TransformParams::default();

        let result = converter.normalize(&source, &normalized, &params).await.unwrap();
        assert_eq!(result.side, 640);
        let info = converter.inspect(&normalized).await.unwrap();
        assert_eq!(info.dimensions(), Some((640, 640)));

        let packed = converter.pack(&normalized, &note, &params).await.unwrap();
        assert_eq!(packed.side, 256);
        let info = converter.inspect(&note).await.unwrap();
        assert_eq!(info.dimensions(), Some((256, 256)));
    }
}
