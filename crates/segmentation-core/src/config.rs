//! Run configuration and the artifact layout derived from it

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// File name of the segmentation model inside a precision directory
pub const MODEL_FILE_NAME: &str = "surgical_tools_parts.onnx";

/// Progress file written after every frame
pub const PROGRESS_FILE_NAME: &str = "i_progress.txt";

/// Stats file written once at the end of a run
pub const STATS_FILE_NAME: &str = "stats.json";

/// Annotated output video
pub const VIDEO_FILE_NAME: &str = "output.mp4";

/// Accelerator an inference session runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    /// NVIDIA GPU through CUDA
    Gpu,
    /// Apple Neural Engine / GPU through CoreML
    CoreMl,
}

impl FromStr for Device {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CPU" => Ok(Device::Cpu),
            "GPU" | "CUDA" => Ok(Device::Gpu),
            "COREML" => Ok(Device::CoreMl),
            _ => Err(PipelineError::Configuration(format!(
                "Unknown device '{s}' (expected CPU, GPU or COREML)"
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Cpu => "CPU",
            Device::Gpu => "GPU",
            Device::CoreMl => "COREML",
        })
    }
}

/// Numeric precision of the exported model weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelPrecision {
    Fp32,
    Fp16,
}

impl FromStr for ModelPrecision {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FP32" => Ok(ModelPrecision::Fp32),
            "FP16" => Ok(ModelPrecision::Fp16),
            _ => Err(PipelineError::Configuration(format!(
                "Unknown model variant '{s}' (expected FP32 or FP16)"
            ))),
        }
    }
}

impl fmt::Display for ModelPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelPrecision::Fp32 => "FP32",
            ModelPrecision::Fp16 => "FP16",
        })
    }
}

/// Everything a single segmentation run needs to know
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub device: Device,
    pub precision: ModelPrecision,
    /// Input video
    pub input: PathBuf,
    /// Root directory for run artifacts
    pub output_dir: PathBuf,
    /// Batch job identifier; artifacts go to `output_dir/<job_id>` when set
    pub job_id: Option<String>,
    /// Directory holding one subdirectory per model precision
    pub model_root: PathBuf,
}

impl RunConfig {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            device: Device::Cpu,
            precision: ModelPrecision::Fp32,
            input: input.into(),
            output_dir: output_dir.into(),
            job_id: None,
            model_root: PathBuf::from("models"),
        }
    }

    /// Directory all artifacts of this run are written to
    #[must_use]
    pub fn job_dir(&self) -> PathBuf {
        match &self.job_id {
            Some(id) => self.output_dir.join(id),
            None => self.output_dir.clone(),
        }
    }

    #[must_use]
    pub fn progress_path(&self) -> PathBuf {
        self.job_dir().join(PROGRESS_FILE_NAME)
    }

    #[must_use]
    pub fn stats_path(&self) -> PathBuf {
        self.job_dir().join(STATS_FILE_NAME)
    }

    #[must_use]
    pub fn video_path(&self) -> PathBuf {
        self.job_dir().join(VIDEO_FILE_NAME)
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.model_root
            .join(self.precision.to_string())
            .join(MODEL_FILE_NAME)
    }

    /// Check the input exists and create the job directory
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the input is not a file or the job
    /// directory cannot be created.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.input.is_file() {
            return Err(PipelineError::Configuration(format!(
                "Input video not found: {}",
                self.input.display()
            )));
        }

        let job_dir = self.job_dir();
        std::fs::create_dir_all(&job_dir).map_err(|e| {
            PipelineError::Configuration(format!(
                "Cannot create output directory {}: {e}",
                job_dir.display()
            ))
        })?;
        Ok(())
    }
}

/// Job identifier as handed out by the batch scheduler (`1234.server` → `1234`)
#[must_use]
pub fn normalize_job_id(raw: &str) -> Option<String> {
    let id = raw.trim().split('.').next().unwrap_or_default();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("GPU".parse::<Device>().unwrap(), Device::Gpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Gpu);
        assert_eq!("CoreML".parse::<Device>().unwrap(), Device::CoreMl);
        assert!(matches!(
            "MYRIAD".parse::<Device>(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_precision_parsing() {
        assert_eq!("fp16".parse::<ModelPrecision>().unwrap(), ModelPrecision::Fp16);
        assert_eq!(ModelPrecision::Fp32.to_string(), "FP32");
        assert!("INT4".parse::<ModelPrecision>().is_err());
    }

    #[test]
    fn test_artifact_paths_with_job_id() {
        let mut config = RunConfig::new("video.mp4", "results");
        config.job_id = Some("4242".to_string());
        config.precision = ModelPrecision::Fp16;

        assert_eq!(config.job_dir(), PathBuf::from("results/4242"));
        assert_eq!(
            config.progress_path(),
            PathBuf::from("results/4242/i_progress.txt")
        );
        assert_eq!(config.stats_path(), PathBuf::from("results/4242/stats.json"));
        assert_eq!(config.video_path(), PathBuf::from("results/4242/output.mp4"));
        assert_eq!(
            config.model_path(),
            PathBuf::from("models/FP16/surgical_tools_parts.onnx")
        );
    }

    #[test]
    fn test_artifact_paths_without_job_id() {
        let config = RunConfig::new("video.mp4", "results");
        assert_eq!(config.job_dir(), PathBuf::from("results"));
        assert_eq!(config.stats_path(), PathBuf::from("results/stats.json"));
    }

    #[test]
    fn test_normalize_job_id() {
        assert_eq!(normalize_job_id("12345.c009\n"), Some("12345".to_string()));
        assert_eq!(normalize_job_id("777"), Some("777".to_string()));
        assert_eq!(normalize_job_id("  "), None);
        assert_eq!(normalize_job_id(".host"), None);
    }

    #[test]
    fn test_validate_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::new(dir.path().join("missing.mp4"), dir.path());
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_creates_job_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mp4");
        std::fs::write(&input, b"not really a video").unwrap();

        let mut config = RunConfig::new(&input, dir.path().join("out"));
        config.job_id = Some("99".to_string());
        assert!(!config.job_dir().exists());
        config.validate().unwrap();
        assert!(config.job_dir().is_dir());
    }
}
