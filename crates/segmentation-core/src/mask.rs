//! Mask decoding: raw segmentation activations to an RGB overlay image

use crate::error::PipelineError;
use crate::inference::RawOutput;
use image::{Rgb, RgbImage};
use surgery_seg_common::{CROP_HEIGHT, CROP_WIDTH};

/// 8-bit RGB overlay, one color channel per foreground class
pub type MaskImage = RgbImage;

/// Foreground classes the overlay has room for (R, G, B)
pub const FOREGROUND_CHANNELS: usize = 3;

/// Scale an activation to an 8-bit intensity, `floor(v * 255)` saturated to [0, 255]
#[inline]
#[must_use]
pub fn activation_to_u8(value: f32) -> u8 {
    // `as` saturates out-of-range values and maps NaN to 0
    (value * 255.0).floor() as u8
}

/// Decode the first batch item of a raw output into a mask image
///
/// Channel 0 (background) is dropped; foreground channels 1, 2 and 3 become
/// the red, green and blue channels of the mask.
///
/// # Errors
///
/// - `MaskChannelMismatch` if the output does not carry exactly three
///   foreground channels
/// - `InvalidOutputShape` if the batch is empty or the spatial size differs
///   from the crop
pub fn decode_mask(raw: &RawOutput) -> Result<MaskImage, PipelineError> {
    let &[batch, channels, height, width] = raw.shape() else {
        return Err(PipelineError::InvalidOutputShape(raw.shape().to_vec()));
    };

    let foreground = channels.saturating_sub(1);
    if foreground != FOREGROUND_CHANNELS {
        return Err(PipelineError::MaskChannelMismatch {
            expected: FOREGROUND_CHANNELS,
            actual: foreground,
        });
    }
    if batch == 0 || height != CROP_HEIGHT as usize || width != CROP_WIDTH as usize {
        return Err(PipelineError::InvalidOutputShape(raw.shape().to_vec()));
    }

    Ok(RgbImage::from_fn(CROP_WIDTH, CROP_HEIGHT, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            activation_to_u8(raw[[0, 1, y, x]]),
            activation_to_u8(raw[[0, 2, y, x]]),
            activation_to_u8(raw[[0, 3, y, x]]),
        ])
    }))
}
