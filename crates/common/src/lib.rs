/// Common frame types and capability traits for the segmentation pipeline
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of the centered crop every frame is reduced to
pub const CROP_WIDTH: u32 = 1280;

/// Height of the centered crop every frame is reduced to
pub const CROP_HEIGHT: u32 = 1024;

/// Frame rate of the annotated output video
pub const OUTPUT_FPS: f64 = 6.0;

/// Bytes per pixel of a packed 8-bit 3-channel frame
pub const CHANNELS: usize = 3;

/// Errors raised by frame sources and sinks
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("No video stream found")]
    NoVideoStream,

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("Encoder error: {0}")]
    EncoderError(String),

    #[error("Invalid frame buffer: expected {expected} bytes, got {actual}")]
    InvalidFrameBuffer { expected: usize, actual: usize },

    #[error("Frame does not match sink: {0}")]
    FrameMismatch(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for source/sink operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Byte order of the three channels in a packed pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Blue, green, red (decoder ingest order)
    Bgr,
    /// Red, green, blue (model order)
    Rgb,
}

impl ChannelOrder {
    /// Byte offset of the red channel within a pixel
    #[must_use]
    pub fn red_offset(self) -> usize {
        match self {
            ChannelOrder::Bgr => 2,
            ChannelOrder::Rgb => 0,
        }
    }

    /// Byte offset of the blue channel within a pixel
    #[must_use]
    pub fn blue_offset(self) -> usize {
        2 - self.red_offset()
    }
}

/// Packed 8-bit 3-channel image, row-major with no row padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a packed pixel buffer
    ///
    /// # Errors
    ///
    /// Returns `InvalidFrameBuffer` if `data` is not exactly `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self> {
        let expected = Self::buffer_len(width, height);
        if data.len() != expected {
            return Err(ProcessingError::InvalidFrameBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    /// Frame with every pixel set to the same channel values (in `order`)
    #[must_use]
    pub fn filled(width: u32, height: u32, order: ChannelOrder, pixel: [u8; 3]) -> Self {
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(Self::buffer_len(width, height))
            .collect();
        Self {
            width,
            height,
            order,
            data,
        }
    }

    /// Frame whose pixels are produced by `f(x, y)` (channel values in `order`)
    pub fn from_fn(
        width: u32,
        height: u32,
        order: ChannelOrder,
        mut f: impl FnMut(u32, u32) -> [u8; 3],
    ) -> Self {
        let mut data = Vec::with_capacity(Self::buffer_len(width, height));
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            order,
            data,
        }
    }

    fn buffer_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    /// Raw packed pixel bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Channel values of the pixel at `(x, y)`, in the frame's channel order
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the frame.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    /// Bytes of row `y`
    #[must_use]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }
}

/// Basic properties of an input video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Declared or estimated frame count, may exceed what the stream delivers
    pub total_frames: u64,
}

/// Supplies decoded frames in presentation order
pub trait FrameSource {
    /// Next decoded frame, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Declared frame count of the stream
    fn total_count(&self) -> u64;
}

/// Consumes annotated frames and writes them to the output video
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the output; calling it again is a no-op
    fn close(&mut self) -> Result<()>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn total_count(&self) -> u64 {
        (**self).total_count()
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
