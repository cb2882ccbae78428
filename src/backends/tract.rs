//! Tract backend implementation for segmentation models
//!
//! Tract is a pure Rust ONNX inference engine: no native libraries, CPU only.
//! The graph is specialized to a fixed `1x3xSxS` input at load time so the
//! optimizer can resolve BiRefNet's dynamic axes.

use crate::error::{BgStudioError, Result};
use crate::inference::{final_output, InferenceBackend};
use crate::models::ModelInfo;
use instant::Instant;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
    info: ModelInfo,
}

impl TractBackend {
    /// Load, specialize and optimize an ONNX model for an `input_size` square input
    ///
    /// # Errors
    /// - Model bytes are not a valid ONNX graph
    /// - The graph cannot be typed or optimized for the given input shape
    pub fn from_bytes(model_data: &[u8], name: String, input_size: u32) -> Result<Self> {
        let model_load_start = Instant::now();
        let info = ModelInfo::square(name, model_data.len(), input_size);

        log::info!("🚀 Initializing Tract Backend");
        log::info!("🧠 Model: {}", info.name);
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!("📏 Model size: {size_mb:.2} MB");

        let size = input_size as usize;
        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgStudioError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| BgStudioError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgStudioError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| BgStudioError::model(format!("Failed to create runnable model: {e}")))?;

        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_start.elapsed().as_millis()
        );

        Ok(Self { model, info })
    }

    /// Tract runs on the CPU only
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }
}

impl InferenceBackend for TractBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        log::debug!("🔮 Running Tract inference, input tensor: {:?}", input.shape());

        let values: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &values)
            .map_err(|e| BgStudioError::inference(format!("Failed to build input tensor: {e}")))?;

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgStudioError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = final_output(outputs)?;

        let output_view = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgStudioError::inference(format!("Failed to convert output tensor: {e}"))
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

        log::debug!("  - Output tensor: {:?}", output_array.shape());
        Ok(output_array)
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn backend_name(&self) -> &'static str {
        "tract"
    }
}

#[cfg(all(test, feature = "tract"))]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_model_bytes_rejected() {
        let err = TractBackend::from_bytes(b"definitely not onnx", "junk".to_string(), 32)
            .unwrap_err();
        assert!(matches!(err, BgStudioError::Model(_)));
        assert!(err.to_string().contains("Failed to load ONNX model"));
    }

    #[test]
    fn test_cpu_is_only_provider() {
        let providers = TractBackend::list_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].0, "CPU");
        assert!(providers[0].1);
    }
}
