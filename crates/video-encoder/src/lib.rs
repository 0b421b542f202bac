//! Output video writer using FFmpeg
//!
//! Annotated frames are streamed as raw BGR24 into an `ffmpeg` child process
//! that encodes them at a fixed resolution and frame rate into an MP4 file.
//!
//! # Example
//! ```no_run
//! use surgery_seg_common::{ChannelOrder, Frame, FrameSink};
//! use surgery_seg_encoder::{EncoderConfig, VideoFileSink};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sink = VideoFileSink::create(Path::new("output.mp4"), EncoderConfig::default())?;
//! let frame = Frame::filled(1280, 1024, ChannelOrder::Bgr, [0, 0, 0]);
//! sink.write_frame(&frame)?;
//! sink.close()?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use surgery_seg_common::{
    ChannelOrder, Frame, FrameSink, ProcessingError, Result, CROP_HEIGHT, CROP_WIDTH, OUTPUT_FPS,
};
use tracing::{debug, warn};

/// Supported output video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264/AVC - widely compatible
    H264,
    /// H.265/HEVC - better compression, less compatible
    H265,
}

impl VideoCodec {
    fn to_ffmpeg_str(self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
        }
    }
}

/// Encoder settings; resolution and frame rate are fixed for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: VideoCodec,
    /// Constant rate factor (None = encoder default)
    pub crf: Option<u8>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: CROP_WIDTH,
            height: CROP_HEIGHT,
            fps: OUTPUT_FPS,
            codec: VideoCodec::H264,
            crf: None,
        }
    }
}

/// Frame sink that encodes to a video file through `ffmpeg`
pub struct VideoFileSink {
    config: EncoderConfig,
    path: PathBuf,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    frames_written: u64,
}

impl VideoFileSink {
    /// Start an encoder writing to `path` (overwritten if present)
    ///
    /// # Errors
    ///
    /// Returns `EncoderError` if the `ffmpeg` process cannot be started.
    pub fn create(path: &Path, config: EncoderConfig) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(ffmpeg_args(&config, path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProcessingError::EncoderError(format!("Failed to execute ffmpeg: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ProcessingError::EncoderError("ffmpeg stdin was not captured".to_string())
        })?;

        debug!(
            "Encoding {}x{} @ {} fps ({}) to {}",
            config.width,
            config.height,
            config.fps,
            config.codec.to_ffmpeg_str(),
            path.display()
        );

        Ok(Self {
            config,
            path: path.to_path_buf(),
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            frames_written: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for VideoFileSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        check_frame(&self.config, frame)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProcessingError::EncoderError("Sink already closed".to_string()))?;
        stdin.write_all(frame.data()).map_err(|e| {
            ProcessingError::EncoderError(format!("ffmpeg stopped accepting frames: {e}"))
        })?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }

        let Some(child) = self.child.take() else {
            return Ok(());
        };

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessingError::EncoderError(format!(
                "ffmpeg failed: {}",
                stderr.trim()
            )));
        }

        debug!(
            "Finalized {} ({} frames)",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.close() {
                warn!("Failed to finalize {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Command line for a raw BGR24 stdin → encoded file `ffmpeg` process
fn ffmpeg_args(config: &EncoderConfig, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "bgr24",
    ]
    .iter()
    .map(OsString::from)
    .collect();

    args.push("-s".into());
    args.push(format!("{}x{}", config.width, config.height).into());
    args.push("-r".into());
    args.push(config.fps.to_string().into());
    args.push("-i".into());
    args.push("-".into());
    args.push("-an".into());
    args.push("-c:v".into());
    args.push(config.codec.to_ffmpeg_str().into());
    if let Some(crf) = config.crf {
        args.push("-crf".into());
        args.push(crf.to_string().into());
    }
    args.push("-pix_fmt".into());
    args.push("yuv420p".into());
    args.push("-movflags".into());
    args.push("+faststart".into());
    args.push(output.as_os_str().to_os_string());
    args
}

/// Ensure a frame matches the fixed encoder geometry and byte layout
fn check_frame(config: &EncoderConfig, frame: &Frame) -> Result<()> {
    if frame.width() != config.width || frame.height() != config.height {
        return Err(ProcessingError::FrameMismatch(format!(
            "frame is {}x{}, sink expects {}x{}",
            frame.width(),
            frame.height(),
            config.width,
            config.height
        )));
    }
    if frame.channel_order() != ChannelOrder::Bgr {
        return Err(ProcessingError::FrameMismatch(
            "sink expects BGR channel order".to_string(),
        ));
    }
    Ok(())
}
