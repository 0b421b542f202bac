//! Center crop and tensor conversion for the segmentation model
//!
//! Every frame is reduced to a fixed 1280x1024 window taken from its center.
//! The cropped frame is kept for compositing; its pixels are reordered to RGB,
//! scaled to [0, 1] and laid out as NCHW with a batch of one.

use crate::error::PipelineError;
use crate::inference::Tensor;
use ndarray::Array4;
use surgery_seg_common::{Frame, CHANNELS, CROP_HEIGHT, CROP_WIDTH};

/// Output of preprocessing one frame
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Centered crop of the source frame, in its original channel order
    pub cropped: Frame,
    /// Model input, shape (1, 3, 1024, 1280), RGB, values in [0, 1]
    pub tensor: Tensor,
}

/// Top/left offsets of the centered crop as `(start_h, start_w)`
///
/// # Errors
///
/// Returns `InvalidFrameSize` if the frame is smaller than the crop in either
/// dimension.
pub fn crop_offsets(width: u32, height: u32) -> Result<(u32, u32), PipelineError> {
    let start_h = (i64::from(height) - i64::from(CROP_HEIGHT)).div_euclid(2);
    let start_w = (i64::from(width) - i64::from(CROP_WIDTH)).div_euclid(2);
    if start_h < 0 || start_w < 0 {
        return Err(PipelineError::InvalidFrameSize {
            width,
            height,
            crop_width: CROP_WIDTH,
            crop_height: CROP_HEIGHT,
        });
    }
    Ok((start_h as u32, start_w as u32))
}

/// Extract the centered crop of `frame`
///
/// # Errors
///
/// Returns `InvalidFrameSize` if the frame is smaller than the crop.
pub fn center_crop(frame: &Frame) -> Result<Frame, PipelineError> {
    let (start_h, start_w) = crop_offsets(frame.width(), frame.height())?;

    if start_h == 0 && start_w == 0 && frame.width() == CROP_WIDTH && frame.height() == CROP_HEIGHT
    {
        return Ok(frame.clone());
    }

    let row_start = start_w as usize * CHANNELS;
    let row_len = CROP_WIDTH as usize * CHANNELS;
    let mut data = Vec::with_capacity(row_len * CROP_HEIGHT as usize);
    for y in start_h..start_h + CROP_HEIGHT {
        data.extend_from_slice(&frame.row(y)[row_start..row_start + row_len]);
    }

    Frame::new(CROP_WIDTH, CROP_HEIGHT, frame.channel_order(), data)
        .map_err(|e| PipelineError::Configuration(e.to_string()))
}

/// Convert a cropped frame into the model's RGB NCHW input tensor
#[must_use]
pub fn to_tensor(cropped: &Frame) -> Tensor {
    let width = cropped.width() as usize;
    let height = cropped.height() as usize;
    let order = cropped.channel_order();
    let data = cropped.data();

    // Model channel c (R, G, B) lives at this byte offset in the source pixel
    let offsets = [order.red_offset(), 1, order.blue_offset()];

    let mut tensor = Array4::<f32>::zeros((1, 3, height, width));
    for (c, &offset) in offsets.iter().enumerate() {
        let mut plane = tensor.slice_mut(ndarray::s![0, c, .., ..]);
        for ((y, x), value) in plane.indexed_iter_mut() {
            let byte = data[(y * width + x) * CHANNELS + offset];
            *value = f32::from(byte) / 255.0;
        }
    }
    tensor
}

/// Crop a raw frame and build its model input
///
/// # Errors
///
/// Returns `InvalidFrameSize` if the frame is smaller than the crop.
pub fn preprocess(frame: &Frame) -> Result<Preprocessed, PipelineError> {
    let cropped = center_crop(frame)?;
    let tensor = to_tensor(&cropped);
    Ok(Preprocessed { cropped, tensor })
}
