//! Inference capability and its ONNX Runtime implementation
//!
//! The pipeline only sees the [`Inferer`] trait: one blocking forward pass per
//! tensor. [`OrtInferer`] backs it with an ONNX Runtime session bound to a
//! single execution provider chosen from the run's [`Device`].

use crate::config::Device;
use crate::error::PipelineError;
use ndarray::Array4;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Model input: (batch=1, channel=3, height, width), RGB in [0, 1]
pub type Tensor = Array4<f32>;

/// Model output: (batch, 1 + foreground classes, height, width)
pub type RawOutput = Array4<f32>;

/// Name of the image input binding
pub const INPUT_NAME: &str = "image";

/// Name of the segmentation output binding in the exported model
pub const OUTPUT_NAME: &str = "toolmask/mul_";

/// Executes one forward pass per input tensor
pub trait Inferer {
    /// Run the model on `tensor`, blocking until the output is ready
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run and is not retried.
    fn infer(&mut self, tensor: Tensor) -> Result<RawOutput, PipelineError>;
}

impl<T: Inferer + ?Sized> Inferer for Box<T> {
    fn infer(&mut self, tensor: Tensor) -> Result<RawOutput, PipelineError> {
        (**self).infer(tensor)
    }
}

impl<T: Inferer + ?Sized> Inferer for &mut T {
    fn infer(&mut self, tensor: Tensor) -> Result<RawOutput, PipelineError> {
        (**self).infer(tensor)
    }
}

/// Intra-op thread count: physical cores unless `SURGERY_SEG_THREADS` is set
fn intra_threads() -> usize {
    std::env::var("SURGERY_SEG_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

/// Execution provider for `device`, or `CapabilityUnsupported` if this host cannot provide it
fn execution_provider(device: Device) -> Result<ExecutionProviderDispatch, PipelineError> {
    let unsupported = |detail: String| PipelineError::CapabilityUnsupported {
        device: device.to_string(),
        detail,
    };

    let (available, dispatch) = match device {
        Device::Cpu => return Ok(CPUExecutionProvider::default().build()),
        Device::Gpu => {
            let ep = CUDAExecutionProvider::default();
            (ep.is_available(), ep.build())
        }
        Device::CoreMl => {
            let ep = CoreMLExecutionProvider::default().with_subgraphs(true);
            (ep.is_available(), ep.build())
        }
    };

    match available {
        Ok(true) => Ok(dispatch.error_on_failure()),
        Ok(false) => Err(unsupported(
            "execution provider is not available on this host".to_string(),
        )),
        Err(e) => Err(unsupported(e.to_string())),
    }
}

/// ONNX Runtime backed inferer
pub struct OrtInferer {
    session: Session,
    device: Device,
    input_name: String,
    output_name: String,
}

impl OrtInferer {
    /// Load the segmentation model for `device`
    ///
    /// # Errors
    ///
    /// - `Configuration` if the model file is missing or lacks the expected bindings
    /// - `CapabilityUnsupported` if the device cannot be used or cannot run the model
    pub fn open(model_path: &Path, device: Device) -> Result<Self, PipelineError> {
        if !model_path.is_file() {
            return Err(PipelineError::Configuration(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let start = Instant::now();
        info!("Loading segmentation model {} on {}", model_path.display(), device);

        let session = Session::builder()
            .map_err(|e| PipelineError::Configuration(format!("Session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PipelineError::Configuration(format!("Session builder: {e}")))?
            .with_intra_threads(intra_threads())
            .map_err(|e| PipelineError::Configuration(format!("Session builder: {e}")))?
            .with_memory_pattern(true)
            .map_err(|e| PipelineError::Configuration(format!("Session builder: {e}")))?
            .with_execution_providers([execution_provider(device)?])
            .map_err(|e| PipelineError::CapabilityUnsupported {
                device: device.to_string(),
                detail: e.to_string(),
            })?
            .commit_from_file(model_path)
            .map_err(|e| PipelineError::CapabilityUnsupported {
                device: device.to_string(),
                detail: format!("failed to load {}: {e}", model_path.display()),
            })?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let input_name = select_binding(&input_names, INPUT_NAME, true).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "Model has no '{INPUT_NAME}' input (inputs: {input_names:?})"
            ))
        })?;
        let output_name = select_binding(&output_names, OUTPUT_NAME, false).ok_or_else(|| {
            PipelineError::Configuration("Model has no outputs".to_string())
        })?;

        info!(
            "Model loaded in {:.3}s (input '{}', output '{}')",
            start.elapsed().as_secs_f64(),
            input_name,
            output_name
        );

        Ok(Self {
            session,
            device,
            input_name,
            output_name,
        })
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }
}

impl Inferer for OrtInferer {
    fn infer(&mut self, tensor: Tensor) -> Result<RawOutput, PipelineError> {
        let input = TensorRef::from_array_view(tensor.view())?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])?;

        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        if dims.len() != 4 {
            return Err(PipelineError::InvalidOutputShape(dims));
        }
        let (batch, channels, height, width) = (dims[0], dims[1], dims[2], dims[3]);
        debug!(
            "Output '{}' shape [{}, {}, {}, {}]",
            self.output_name, batch, channels, height, width
        );

        Array4::from_shape_vec((batch, channels, height, width), data.to_vec())
            .map_err(|e| PipelineError::InferenceFailure(format!("Malformed output tensor: {e}")))
    }
}

/// Pick a binding by name; otherwise the first one (outputs) or the only one (inputs)
fn select_binding(names: &[String], preferred: &str, require_unique: bool) -> Option<String> {
    if let Some(name) = names.iter().find(|n| n.as_str() == preferred) {
        return Some(name.clone());
    }
    match names {
        [only] => Some(only.clone()),
        [first, ..] if !require_unique => Some(first.clone()),
        _ => None,
    }
}
