// src/object_detection/backend.rs

use super::config::{Backend, ObjectDetectorConfig};
use super::postprocess::RawOutput;
use crate::error::{DetectorError, DetectorResult};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider,
        ExecutionProviderDispatch,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::path::Path;
use tracing::{debug, info};

/// A compute target able to run the detection network on a prepared blob
pub trait InferenceBackend: Send {
    fn name(&self) -> &'static str;

    /// `blob` is a `1 x 3 x input_size x input_size` CHW tensor in [0, 1]
    fn infer(&mut self, blob: &[f32], input_size: usize) -> DetectorResult<RawOutput>;
}

/// Build the backend strategy for `config.backend`
pub fn build_backend(
    config: &ObjectDetectorConfig,
    model_path: &Path,
) -> DetectorResult<Box<dyn InferenceBackend>> {
    let provider = match config.backend {
        Backend::Cpu => cpu_provider(),
        Backend::Cuda => cuda_provider()?,
    };

    let backend = OrtBackend::new(config, model_path, provider)?;
    Ok(Box::new(backend))
}

fn cpu_provider() -> ExecutionProviderDispatch {
    CPUExecutionProvider::default().build().error_on_failure()
}

fn cuda_provider() -> DetectorResult<ExecutionProviderDispatch> {
    let provider = CUDAExecutionProvider::default().with_device_id(0);

    let available = provider.is_available().unwrap_or(false);
    if !available {
        return Err(DetectorError::BackendUnavailable {
            backend: Backend::Cuda.to_string(),
        });
    }

    Ok(provider.build().error_on_failure())
}

/// ONNX Runtime session bound to one execution provider
pub struct OrtBackend {
    session: Session,
    input_name: String,
    backend: Backend,
}

impl OrtBackend {
    fn new(
        config: &ObjectDetectorConfig,
        model_path: &Path,
        provider: ExecutionProviderDispatch,
    ) -> DetectorResult<Self> {
        info!("Loading YOLO model: {}", model_path.display());

        if !model_path.is_file() {
            return Err(DetectorError::ModelLoad {
                path: model_path.display().to_string(),
                reason: "file not found".to_string(),
            });
        }

        let load_error = |e: ort::Error| DetectorError::ModelLoad {
            path: model_path.display().to_string(),
            reason: e.to_string(),
        };

        let session = Session::builder()
            .map_err(load_error)?
            .with_execution_providers([provider])
            .map_err(|_| DetectorError::BackendUnavailable {
                backend: config.backend.to_string(),
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .with_intra_threads(config.num_threads)
            .map_err(load_error)?
            .commit_from_file(model_path)
            .map_err(load_error)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        info!(
            "✓ YOLO session ready on {} (input '{}')",
            config.backend, input_name
        );

        Ok(Self {
            session,
            input_name,
            backend: config.backend,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn name(&self) -> &'static str {
        self.backend.as_str()
    }

    fn infer(&mut self, blob: &[f32], input_size: usize) -> DetectorResult<RawOutput> {
        let shape = [1, 3, input_size, input_size];
        let input_value =
            Tensor::from_array((shape.as_slice(), blob.to_vec().into_boxed_slice()))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_value])?;
        let output = &outputs[0];
        let (output_shape, data) = output.try_extract_tensor::<f32>()?;

        // [1, N, 5 + classes] or [N, 5 + classes]
        let cols = output_shape.last().copied().unwrap_or(0).max(0) as usize;
        if cols == 0 {
            return Err(DetectorError::Inference(format!(
                "unexpected output shape {:?}",
                output_shape
            )));
        }
        let rows = data.len() / cols;

        // `outputs` still borrows the session; name the backend via the field
        debug!(
            "{} backend produced {} raw predictions",
            self.backend.as_str(),
            rows
        );

        Ok(RawOutput {
            rows,
            cols,
            data: data.to_vec(),
        })
    }
}
