//! ONNX Runtime backend implementation for segmentation models
//!
//! Supports the CPU, CUDA and `CoreML` execution providers. `Session::run`
//! needs exclusive access, so the session sits behind a mutex and concurrent
//! requests take turns.

use crate::config::ExecutionProvider;
use crate::error::{BgStudioError, Result};
use crate::inference::{final_output, InferenceBackend};
use crate::models::ModelInfo;
use instant::Instant;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};
use ort::value::Value;
use std::sync::Mutex;

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Mutex<Session>,
    info: ModelInfo,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a session from ONNX model bytes
    ///
    /// # Errors
    /// - Session builder or execution provider configuration failures
    /// - Model bytes rejected by ONNX Runtime
    pub fn from_bytes(
        model_data: &[u8],
        name: String,
        input_size: u32,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> Result<Self> {
        let model_load_start = Instant::now();
        let info = ModelInfo::square(name, model_data.len(), input_size);

        log::info!("🚀 Initializing ONNX Runtime Backend");
        log::info!("🧠 Model: {}", info.name);

        let session_builder = Session::builder()
            .map_err(|e| {
                BgStudioError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgStudioError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let session_builder = Self::configure_provider(session_builder, provider)?;

        // 0 means all available cores
        let intra_threads = if intra_threads > 0 {
            intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(8)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgStudioError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(model_data)
            .map_err(|e| {
                BgStudioError::model(format!("Failed to create session from model data: {e}"))
            })?;

        log::debug!("Session configuration:");
        log::debug!("  - Requested provider: {provider}");
        log::debug!("  - Threading: {intra_threads} intra-op threads");
        log::info!(
            "📊 Model loading complete: {}ms",
            model_load_start.elapsed().as_millis()
        );

        Ok(Self {
            session: Mutex::new(session),
            info,
        })
    }

    fn configure_provider(
        session_builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let cuda_provider = CUDAExecutionProvider::default();
        let coreml_provider = CoreMLExecutionProvider::default();
        let cuda_available = || OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false);
        let coreml_available =
            || OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false);

        let providers = match provider {
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Auto => {
                // CUDA > CoreML > CPU
                let mut providers = Vec::new();
                if cuda_available() {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                }
                providers
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    vec![CUDAExecutionProvider::default().build()]
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    Vec::new()
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    vec![CoreMLExecutionProvider::default().with_subgraphs(true).build()]
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                    Vec::new()
                }
            },
        };

        if providers.is_empty() {
            return Ok(session_builder);
        }
        session_builder
            .with_execution_providers(providers)
            .map_err(|e| {
                BgStudioError::inference(format!("Failed to set execution providers: {e}"))
            })
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgStudioError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BgStudioError::inference("ONNX session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgStudioError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access: BiRefNet exports name their outputs inconsistently
        let final_key = final_output(outputs.keys().map(str::to_string))?;
        let output_view = outputs
            .get(&final_key)
            .ok_or_else(|| BgStudioError::inference("Final output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgStudioError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let shape = output_view.shape().to_vec();
        let [n, c, h, w] = shape.as_slice() else {
            return Err(BgStudioError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };
        let output_array =
            Array4::from_shape_vec((*n, *c, *h, *w), output_view.iter().copied().collect())
                .map_err(|e| {
                    BgStudioError::inference(format!("Failed to reshape output tensor: {e}"))
                })?;

        log::debug!(
            "  ⚡ Core inference: {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );
        Ok(output_array)
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn backend_name(&self) -> &'static str {
        "onnx"
    }
}

#[cfg(all(test, feature = "onnx"))]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_provider_always_listed() {
        let providers = OnnxBackend::list_providers();
        assert_eq!(providers.len(), 3);
        assert_eq!(providers[0].0, "CPU");
        assert!(providers[0].1);
    }
}
