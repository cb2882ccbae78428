//! Segmentation capability and the inference backend abstraction
//!
//! [`SegmentationModel`] is what the processor depends on: given an image,
//! return an opacity mask. [`OnnxSegmenter`] implements it on top of any
//! [`InferenceBackend`] that can run an NCHW tensor through an ONNX graph.

use crate::{
    error::{BgStudioError, Result},
    models::{ModelInfo, PreprocessingConfig},
    types::SegmentationMask,
    utils::{tensor_to_mask, ImagePreprocessor},
};
use image::DynamicImage;
use instant::Instant;
use ndarray::Array4;

/// Produces a foreground opacity mask for an image
///
/// Implementations are shared across requests and must be usable from
/// several threads at once. The returned mask may be at model resolution;
/// callers resample it to the image size.
pub trait SegmentationModel: Send + Sync {
    /// Segment the foreground of `image`
    ///
    /// # Errors
    /// - Preprocessing or inference failures
    fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask>;

    /// Model name for logs and result metadata
    fn name(&self) -> &str;
}

/// Trait for inference backends
pub trait InferenceBackend: Send + Sync {
    /// Run inference on an NCHW input tensor, returning the final output
    ///
    /// # Errors
    /// - Model inference failures
    /// - Tensor conversion errors or unexpected output rank
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get model information for this backend
    fn model_info(&self) -> &ModelInfo;

    /// Short backend identifier ("tract", "onnx")
    fn backend_name(&self) -> &'static str;
}

/// Pick the final output of a multi-output graph
///
/// `BiRefNet` exports emit coarse side outputs ahead of the refined mask,
/// which is always last.
///
/// # Errors
/// - The graph produced no outputs
pub fn final_output<T>(outputs: impl IntoIterator<Item = T>) -> Result<T> {
    outputs
        .into_iter()
        .last()
        .ok_or_else(|| BgStudioError::inference("Model produced no outputs"))
}

/// Segmentation model backed by an ONNX network
#[derive(Debug)]
pub struct OnnxSegmenter<B> {
    backend: B,
    preprocessing: PreprocessingConfig,
    apply_sigmoid: bool,
    name: String,
}

impl<B: InferenceBackend> OnnxSegmenter<B> {
    #[must_use]
    pub fn new(backend: B, preprocessing: PreprocessingConfig, apply_sigmoid: bool) -> Self {
        let name = format!(
            "{} ({})",
            backend.model_info().name,
            backend.backend_name()
        );
        Self {
            backend,
            preprocessing,
            apply_sigmoid,
            name,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: InferenceBackend> SegmentationModel for OnnxSegmenter<B> {
    fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask> {
        let preprocess_start = Instant::now();
        let input = ImagePreprocessor::preprocess_for_inference(image, &self.preprocessing)?;
        log::debug!(
            "Preprocessed {}x{} image in {}ms",
            image.width(),
            image.height(),
            preprocess_start.elapsed().as_millis()
        );

        let inference_start = Instant::now();
        let output = self.backend.infer(&input)?;
        log::debug!(
            "{} inference completed in {}ms",
            self.backend.backend_name(),
            inference_start.elapsed().as_millis()
        );

        tensor_to_mask(&output, self.apply_sigmoid)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
