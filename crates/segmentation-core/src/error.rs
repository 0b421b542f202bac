//! Error types for the segmentation pipeline

use surgery_seg_common::ProcessingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Device {device} cannot run the model: {detail}")]
    CapabilityUnsupported { device: String, detail: String },

    #[error("Invalid frame size: {width}x{height} is smaller than the {crop_width}x{crop_height} crop")]
    InvalidFrameSize {
        width: u32,
        height: u32,
        crop_width: u32,
        crop_height: u32,
    },

    #[error("Mask channel mismatch: expected {expected} foreground channels, got {actual}")]
    MaskChannelMismatch { expected: usize, actual: usize },

    #[error("Invalid model output shape: {0:?}")]
    InvalidOutputShape(Vec<usize>),

    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    #[error("Frame source error: {0}")]
    Source(#[source] ProcessingError),

    #[error("Frame sink error: {0}")]
    Sink(#[source] ProcessingError),

    #[error("Pipeline has already run")]
    AlreadyRan,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ort::Error> for PipelineError {
    fn from(err: ort::Error) -> Self {
        PipelineError::InferenceFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::InvalidFrameSize {
            width: 640,
            height: 480,
            crop_width: 1280,
            crop_height: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Invalid frame size: 640x480 is smaller than the 1280x1024 crop"
        );

        let err = PipelineError::MaskChannelMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Mask channel mismatch: expected 3 foreground channels, got 2"
        );
    }
}
