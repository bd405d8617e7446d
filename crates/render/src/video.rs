//! Video frame I/O over ffmpeg pipes.
//!
//! Frames travel as raw `rgb24` buffers: the reader decodes the source to
//! stdout, the writer encodes from stdin. Both child processes are scoped to
//! their handle and are killed and reaped when it drops.

use std::ffi::OsString;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use mosaic_common::config::VideoConfig;
use mosaic_common::error::{MosaicError, MosaicResult};
use mosaic_model::Frame;
use serde::Deserialize;

/// Geometry and timing of a source video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Resolved frame rate; never zero.
    pub fps: f64,
    /// Frame count reported by the container, if any.
    pub frame_count: Option<u64>,
}

/// A stream of frames, in presentation order.
pub trait FrameSource {
    fn dimensions(&self) -> (u32, u32);

    fn fps(&self) -> f64;

    /// The next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> MosaicResult<Option<Frame>>;
}

/// Ordered frame consumer.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> MosaicResult<()>;

    /// Flush and commit the output. No frames may be written afterwards.
    fn finish(&mut self) -> MosaicResult<()>;
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
///
/// Returns `None` for zero, non-finite, or unparsable rates.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// First usable rate out of `avg_frame_rate`, `r_frame_rate`, then `fallback`.
pub fn resolve_fps(
    avg_frame_rate: Option<&str>,
    r_frame_rate: Option<&str>,
    fallback: f64,
) -> f64 {
    avg_frame_rate
        .and_then(parse_frame_rate)
        .or_else(|| r_frame_rate.and_then(parse_frame_rate))
        .unwrap_or(fallback)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees within `0..360`.
    ///
    /// Newer ffprobe reports a display matrix in side data, older builds a
    /// `rotate` tag.
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| {
                self.tags
                    .rotate
                    .as_deref()
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .unwrap_or(0.0);
        if !degrees.is_finite() {
            return 0;
        }
        (degrees.round() as i64).rem_euclid(360)
    }
}

/// Interpret ffprobe's JSON for the first video stream.
pub fn parse_probe_output(json: &str, fallback_fps: f64) -> MosaicResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| MosaicError::video("No video stream found"))?;

    let (coded_width, coded_height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MosaicError::video("Video stream has no dimensions")),
    };

    // ffmpeg applies the display rotation while decoding, so frames on the
    // pipe arrive in display orientation.
    let rotation = stream.rotation();
    let (width, height) = match rotation {
        90 | 270 => (coded_height, coded_width),
        _ => (coded_width, coded_height),
    };
    if rotation != 0 {
        tracing::debug!(rotation, width, height, "Source carries a display rotation");
    }

    let fps = resolve_fps(
        stream.avg_frame_rate.as_deref(),
        stream.r_frame_rate.as_deref(),
        fallback_fps,
    );

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
    })
}

/// Probe a video file with ffprobe.
///
/// Any failure to open or understand the file is [`MosaicError::SourceUnreadable`].
pub fn probe_video(path: &Path, config: &VideoConfig) -> MosaicResult<VideoInfo> {
    if !path.is_file() {
        return Err(MosaicError::source_unreadable(path, "file not found"));
    }

    let output = Command::new(&config.ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames\
             :stream_tags=rotate:stream_side_data=rotation",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            MosaicError::source_unreadable(path, format!("failed to run {}: {e}", config.ffprobe))
        })?;

    if !output.status.success() {
        return Err(MosaicError::source_unreadable(
            path,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout), config.fallback_fps)
        .map_err(|e| MosaicError::source_unreadable(path, e.to_string()))?;

    tracing::debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.fps,
        frames = ?info.frame_count,
        "Probed video"
    );
    Ok(info)
}

/// Whether a binary resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Collect a child's stderr on a thread so a chatty process never blocks.
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    }))
}

fn join_stderr(task: Option<JoinHandle<String>>) -> String {
    task.map(|t| {
        t.join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
    })
    .unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Decodes a video into raw RGB frames.
pub struct FfmpegReader {
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<String>>,
    info: VideoInfo,
    frame_len: usize,
    frames_read: u64,
    finished: bool,
}

impl FfmpegReader {
    pub fn open(path: &Path, info: VideoInfo, config: &VideoConfig) -> MosaicResult<Self> {
        let mut child = Command::new(&config.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-vsync",
                "passthrough",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let reason = format!("failed to start {}: {e}", config.ffmpeg);
                MosaicError::source_unreadable(path, reason)
            })?;

        let stderr_task = drain_stderr(&mut child);
        let Some(stdout) = child.stdout.take() else {
            kill_and_reap(&mut child);
            return Err(MosaicError::video("Failed to capture ffmpeg stdout"));
        };

        tracing::info!(
            pid = child.id(),
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            "Video reader started"
        );

        Ok(Self {
            child,
            stdout,
            stderr_task,
            frame_len: info.width as usize * info.height as usize * 3,
            info,
            frames_read: 0,
            finished: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Fill `buf` completely. Returns bytes read, short only at end of stream.
    fn read_full(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn finish_stream(&mut self) -> MosaicResult<()> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| MosaicError::video(format!("Failed to wait on ffmpeg reader: {e}")))?;
        let stderr = join_stderr(self.stderr_task.take());
        if !status.success() {
            return Err(MosaicError::video(format!(
                "ffmpeg decode failed after {} frames (status {status}): {}",
                self.frames_read,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl FrameSource for FfmpegReader {
    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn fps(&self) -> f64 {
        self.info.fps
    }

    fn next_frame(&mut self) -> MosaicResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let read = self
            .read_full(&mut buf)
            .map_err(|e| MosaicError::video(format!("Failed reading frame: {e}")))?;

        if read == 0 {
            self.finish_stream()?;
            return Ok(None);
        }
        if read < self.frame_len {
            return Err(MosaicError::video(format!(
                "Truncated frame {}: got {read} of {} bytes",
                self.frames_read, self.frame_len
            )));
        }

        self.frames_read += 1;
        Frame::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| MosaicError::video("Frame buffer size mismatch"))
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        if !self.finished {
            kill_and_reap(&mut self.child);
        }
        let _ = join_stderr(self.stderr_task.take());
    }
}

/// Temporary sibling the writer encodes into: `<stem>.partial.<ext>`.
///
/// The extension is kept last so ffmpeg still picks the muxer from it.
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    output.with_file_name(name)
}

/// ffmpeg arguments that encode `width x height` rgb24 frames from stdin at
/// `fps` into `target`.
pub fn writer_args(
    target: &Path,
    width: u32,
    height: u32,
    fps: f64,
    config: &VideoConfig,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push("-s".into());
    args.push(format!("{width}x{height}").into());
    args.push("-r".into());
    args.push(format!("{fps}").into());
    args.extend(["-i", "-", "-an", "-c:v"].map(OsString::from));
    args.push(config.codec.clone().into());
    args.push(target.as_os_str().to_os_string());
    args
}

/// Encodes raw RGB frames into a video file with fixed geometry and rate.
///
/// Output lands at a temporary sibling and is renamed into place only by
/// [`FrameSink::finish`]. Dropping an unfinished writer removes it.
pub struct FfmpegWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    partial: PathBuf,
    output: PathBuf,
    frames_written: u64,
    finished: bool,
}

impl FfmpegWriter {
    pub fn create(
        output: &Path,
        width: u32,
        height: u32,
        fps: f64,
        config: &VideoConfig,
    ) -> MosaicResult<Self> {
        if output.extension().is_none() {
            return Err(MosaicError::unsupported(format!(
                "{}: output needs a container extension such as .mp4",
                output.display()
            )));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let partial = partial_path(output);

        let mut child = Command::new(&config.ffmpeg)
            .args(writer_args(&partial, width, height, fps, config))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MosaicError::video(format!("Failed to start {}: {e}", config.ffmpeg)))?;

        let stderr_task = drain_stderr(&mut child);
        let stdin = child.stdin.take();
        if stdin.is_none() {
            kill_and_reap(&mut child);
            return Err(MosaicError::video("Failed to capture ffmpeg stdin"));
        }

        tracing::info!(
            pid = child.id(),
            output = %output.display(),
            width,
            height,
            fps,
            codec = %config.codec,
            "Video writer started"
        );

        Ok(Self {
            child,
            stdin,
            stderr_task,
            width,
            height,
            partial,
            output: output.to_path_buf(),
            frames_written: 0,
            finished: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn failure(&mut self, context: &str) -> MosaicError {
        self.stdin = None;
        kill_and_reap(&mut self.child);
        let stderr = join_stderr(self.stderr_task.take());
        MosaicError::video(format!("{context}: {}", stderr.trim()))
    }
}

impl FrameSink for FfmpegWriter {
    fn write_frame(&mut self, frame: &Frame) -> MosaicResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MosaicError::video(format!(
                "Frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(MosaicError::video("Writer already finished"));
        };
        if let Err(e) = stdin.write_all(frame.as_raw()) {
            return Err(self.failure(&format!(
                "ffmpeg encoder stopped at frame {} ({e})",
                self.frames_written
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> MosaicResult<()> {
        // Closing stdin signals end of input.
        self.stdin = None;
        let status = self
            .child
            .wait()
            .map_err(|e| MosaicError::video(format!("Failed to wait on ffmpeg writer: {e}")))?;
        let stderr = join_stderr(self.stderr_task.take());
        if !status.success() {
            return Err(MosaicError::video(format!(
                "ffmpeg encode failed (status {status}): {}",
                stderr.trim()
            )));
        }

        std::fs::rename(&self.partial, &self.output)?;
        self.finished = true;
        tracing::info!(
            output = %self.output.display(),
            frames = self.frames_written,
            "Video written"
        );
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.stdin = None;
        kill_and_reap(&mut self.child);
        let _ = join_stderr(self.stderr_task.take());
        if self.partial.exists() {
            if let Err(e) = std::fs::remove_file(&self.partial) {
                tracing::warn!(
                    path = %self.partial.display(),
                    error = %e,
                    "Failed to remove partial output"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("30"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("25/0"), None);
        assert_eq!(parse_frame_rate("0/1"), None);
        assert_eq!(parse_frame_rate("N/A"), None);
    }

    #[test]
    fn test_zero_fps_falls_back() {
        assert_eq!(resolve_fps(Some("0/0"), Some("0/0"), 25.0), 25.0);
        assert_eq!(resolve_fps(Some("0/0"), Some("24/1"), 25.0), 24.0);
        assert_eq!(resolve_fps(None, None, 25.0), 25.0);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "programs": [],
            "streams": [{
                "width": 1280,
                "height": 720,
                "avg_frame_rate": "0/0",
                "r_frame_rate": "0/0",
                "nb_frames": "48"
            }]
        }"#;
        let info = parse_probe_output(json, 25.0).unwrap();
        assert_eq!(
            info,
            VideoInfo {
                width: 1280,
                height: 720,
                fps: 25.0,
                frame_count: Some(48),
            }
        );
    }

    #[test]
    fn test_quarter_turn_rotation_swaps_dimensions() {
        let display_matrix = r#"{"streams": [{
            "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
            "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]
        }]}"#;
        let info = parse_probe_output(display_matrix, 25.0).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let tagged = r#"{"streams": [{
            "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
            "tags": {"rotate": "90"}
        }]}"#;
        let info = parse_probe_output(tagged, 25.0).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let upside_down = r#"{"streams": [{
            "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
            "side_data_list": [{"rotation": 180}]
        }]}"#;
        let info = parse_probe_output(upside_down, 25.0).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    #[test]
    fn test_writer_args_carry_geometry_and_rate() {
        let info = parse_probe_output(
            r#"{"streams": [{"width": 64, "height": 48, "avg_frame_rate": "0/0"}]}"#,
            25.0,
        )
        .unwrap();
        let config = VideoConfig::default();
        let args = writer_args(
            Path::new("out/clip.partial.mp4"),
            info.width,
            info.height,
            info.fps,
            &config,
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        let after = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(after("-s"), "64x48");
        assert_eq!(after("-r"), "25");
        assert_eq!(after("-pix_fmt"), "rgb24");
        assert_eq!(after("-c:v"), config.codec);
        assert_eq!(args.last().map(String::as_str), Some("out/clip.partial.mp4"));
    }

    #[test]
    fn test_writer_rejects_output_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip");
        let err = FfmpegWriter::create(&output, 64, 48, 25.0, &VideoConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, MosaicError::Unsupported { .. }));
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn test_probe_without_stream_is_error() {
        assert!(parse_probe_output(r#"{"streams": []}"#, 25.0).is_err());
        assert!(parse_probe_output(r#"{"streams": [{"width": 0, "height": 10}]}"#, 25.0).is_err());
    }

    #[test]
    fn test_probe_missing_file_is_source_unreadable() {
        let err = probe_video(Path::new("/nonexistent/clip.mp4"), &VideoConfig::default())
            .unwrap_err();
        assert!(err.is_source_unreadable());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/out/clip.mp4")),
            PathBuf::from("/tmp/out/clip.partial.mp4")
        );
        assert_eq!(partial_path(Path::new("clip")), PathBuf::from("clip.partial"));
    }
}
