//! Surgery Segmentation Core - frame-by-frame surgical tool segmentation
//!
//! Each decoded frame is center-cropped to 1280x1024, run through an ONNX
//! segmentation model, and written back with the predicted tool mask blended
//! on top. Progress and timing artifacts are written alongside the video.

pub mod composite;
pub mod config;
pub mod error;
pub mod inference;
pub mod mask;
pub mod pipeline;
pub mod preprocess;
pub mod progress;
pub mod stats;

pub use composite::composite;
pub use config::{normalize_job_id, Device, ModelPrecision, RunConfig};
pub use error::PipelineError;
pub use inference::{Inferer, OrtInferer, RawOutput, Tensor};
pub use mask::{decode_mask, MaskImage};
pub use pipeline::{annotate_frame, PipelineDriver, PipelineState};
pub use preprocess::{center_crop, crop_offsets, preprocess, to_tensor, Preprocessed};
pub use progress::{FileProgressReporter, NoProgress, ProgressRecord, ProgressReporter};
pub use stats::{RunStats, StatsAggregator, StatsRecord};
