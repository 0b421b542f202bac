//! Alpha-blend of the decoded mask onto the cropped frame

use crate::mask::MaskImage;
use surgery_seg_common::Frame;

/// Weight of the original frame
pub const ORIGINAL_WEIGHT: f32 = 1.0;

/// Weight of the mask overlay
pub const MASK_WEIGHT: f32 = 0.5;

/// Additive bias
pub const BIAS: f32 = 0.0;

/// `floor(original * 1.0 + mask * 0.5 + 0)` clipped to [0, 255]
#[inline]
#[must_use]
pub fn blend_channel(original: u8, mask: u8) -> u8 {
    let value = f32::from(original) * ORIGINAL_WEIGHT + f32::from(mask) * MASK_WEIGHT + BIAS;
    value.floor().clamp(0.0, 255.0) as u8
}

/// Blend `mask` onto `original`, keeping the frame's channel order
///
/// The mask is RGB; its red channel lands on the frame's red channel
/// whatever byte order the frame uses.
///
/// # Panics
///
/// Panics if the mask and frame dimensions differ. Both come from the same
/// crop, so a mismatch is a pipeline bug rather than bad input.
#[must_use]
pub fn composite(original: &Frame, mask: &MaskImage) -> Frame {
    assert_eq!(
        (original.width(), original.height()),
        mask.dimensions(),
        "mask and frame dimensions must match"
    );

    let order = original.channel_order();
    let red = order.red_offset();
    let blue = order.blue_offset();

    Frame::from_fn(original.width(), original.height(), order, |x, y| {
        let pixel = original.pixel(x, y);
        let overlay = mask.get_pixel(x, y);
        let mut out = [0u8; 3];
        out[red] = blend_channel(pixel[red], overlay[0]);
        out[1] = blend_channel(pixel[1], overlay[1]);
        out[blue] = blend_channel(pixel[blue], overlay[2]);
        out
    })
}
