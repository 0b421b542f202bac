/// Video file decoder module
///
/// Pulls packets from the container one at a time and decodes them into packed
/// BGR24 frames, so the pipeline only ever holds the frame it is working on.
use ffmpeg_next as ffmpeg;
use std::path::Path;
use surgery_seg_common::{
    ChannelOrder, Frame, FrameSource, ProcessingError, Result, VideoInfo, CHANNELS,
};
use tracing::{debug, warn};

/// `FFmpeg` internal time base (microseconds)
const AV_TIME_BASE: f64 = 1_000_000.0;

/// Frame source backed by a video file
pub struct VideoFileSource {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    info: VideoInfo,
    decoded: ffmpeg::util::frame::video::Video,
    converted: ffmpeg::util::frame::video::Video,
    frames_decoded: u64,
    input_exhausted: bool,
    flushed: bool,
}

impl VideoFileSource {
    /// Open a video file and prepare a BGR24 decoder for its best video stream
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - No video stream is found
    /// - The decoder or scaler cannot be created
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init()
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to initialize: {e}")))?;

        let input = ffmpeg::format::input(&path)
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to open input file: {e}")))?;

        let (stream_index, parameters, declared_frames, fps) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(ProcessingError::NoVideoStream)?;
            (
                stream.index(),
                stream.parameters(),
                stream.frames(),
                f64::from(stream.avg_frame_rate()),
            )
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create context: {e}")))?
            .decoder()
            .video()
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create decoder: {e}")))?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::BGR24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create scaler: {e}")))?;

        let total_frames = if declared_frames > 0 {
            declared_frames as u64
        } else {
            estimate_frame_count(input.duration(), fps)
        };

        let info = VideoInfo {
            width,
            height,
            fps,
            total_frames,
        };
        debug!(
            "Opened {}: {}x{} @ {:.2} fps, {} frames",
            path.display(),
            width,
            height,
            fps,
            total_frames
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            info,
            decoded: ffmpeg::util::frame::video::Video::empty(),
            converted: ffmpeg::util::frame::video::Video::empty(),
            frames_decoded: 0,
            input_exhausted: false,
            flushed: false,
        })
    }

    #[must_use]
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn convert_decoded(&mut self) -> Result<Frame> {
        self.scaler
            .run(&self.decoded, &mut self.converted)
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to convert frame: {e}")))?;

        let width = self.converted.width();
        let height = self.converted.height();
        let data = copy_packed_rows(
            self.converted.data(0),
            self.converted.stride(0),
            width as usize,
            height as usize,
        );
        self.frames_decoded += 1;
        Frame::new(width, height, ChannelOrder::Bgr, data)
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return self.convert_decoded().map(Some);
            }

            if self.flushed {
                debug!("Decoder drained after {} frames", self.frames_decoded);
                return Ok(None);
            }

            if self.input_exhausted {
                self.decoder.send_eof().map_err(|e| {
                    ProcessingError::FFmpegError(format!("Failed to flush decoder: {e}"))
                })?;
                self.flushed = true;
                continue;
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("Skipping undecodable packet: {}", e);
                    }
                }
                Err(ffmpeg::Error::Eof) => self.input_exhausted = true,
                Err(e) => {
                    return Err(ProcessingError::FFmpegError(format!(
                        "Failed to read packet: {e}"
                    )))
                }
            }
        }
    }

    fn total_count(&self) -> u64 {
        self.info.total_frames
    }
}

/// Frame count implied by container duration and average frame rate
fn estimate_frame_count(duration: i64, fps: f64) -> u64 {
    if duration <= 0 || !fps.is_finite() || fps <= 0.0 {
        return 0;
    }
    (duration as f64 / AV_TIME_BASE * fps).round() as u64
}

/// Copy a packed 3-channel plane into a contiguous buffer, dropping row padding
fn copy_packed_rows(plane: &[u8], stride: usize, width: usize, height: usize) -> Vec<u8> {
    let row_len = width * CHANNELS;
    let mut data = Vec::with_capacity(row_len * height);
    for y in 0..height {
        let row_start = y * stride;
        data.extend_from_slice(&plane[row_start..row_start + row_len]);
    }
    data
}
