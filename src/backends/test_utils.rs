//! Test utilities and mock segmenters
//!
//! Mock implementations of `SegmentationModel` and `InferenceBackend` so the
//! processor and server can be tested without model files.

use crate::{
    error::{BgStudioError, Result},
    inference::{InferenceBackend, SegmentationModel},
    models::ModelInfo,
    types::SegmentationMask,
};
use image::DynamicImage;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Rectangle in fractions of the image size: (left, top, right, bottom)
pub type RelativeRect = (f32, f32, f32, f32);

/// Mock segmenter that marks a fixed relative rectangle as foreground
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    /// Foreground rectangle, or `None` for an all-background mask
    rect: Option<RelativeRect>,
    /// Mask resolution; `None` matches the input image size
    resolution: Option<(u32, u32)>,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<(u32, u32)>>>,
    /// Whether to simulate inference failure
    should_fail: bool,
}

impl MockSegmenter {
    /// Foreground covers the given fraction rectangle of the image
    #[must_use]
    pub fn with_rect(rect: RelativeRect) -> Self {
        Self {
            rect: Some(rect),
            resolution: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
        }
    }

    /// Every pixel is background
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rect: None,
            ..Self::with_rect((0.0, 0.0, 0.0, 0.0))
        }
    }

    /// Inference always fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::empty()
        }
    }

    /// Produce masks at a fixed resolution, like a real network would
    #[must_use]
    pub fn at_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some((width, height));
        self
    }

    /// Dimensions of every image seen so far
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.call_history.lock().unwrap().clone()
    }
}

impl SegmentationModel for MockSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask> {
        self.call_history
            .lock()
            .map_err(|_| BgStudioError::inference("mock history poisoned"))?
            .push((image.width(), image.height()));

        if self.should_fail {
            return Err(BgStudioError::inference("Mock inference failure"));
        }

        let (width, height) = self
            .resolution
            .unwrap_or((image.width(), image.height()));
        let mut data = vec![0u8; (width * height) as usize];
        if let Some((l, t, r, b)) = self.rect {
            let to_px = |v: f32, size: u32| (v * size as f32).round() as u32;
            let (left, right) = (to_px(l, width), to_px(r, width));
            let (top, bottom) = (to_px(t, height), to_px(b, height));
            for y in top..bottom.min(height) {
                for x in left..right.min(width) {
                    if let Some(value) = data.get_mut((y * width + x) as usize) {
                        *value = 255;
                    }
                }
            }
        }

        SegmentationMask::new(data, (width, height))
    }

    fn name(&self) -> &str {
        "mock-segmenter"
    }
}

/// Mock backend returning a constant logit map of the input's spatial size
#[derive(Debug)]
pub struct MockBackend {
    info: ModelInfo,
    logit: f32,
}

impl MockBackend {
    #[must_use]
    pub fn new(size: u32, logit: f32) -> Self {
        Self {
            info: ModelInfo::square("mock-model".to_string(), 1024, size),
            logit,
        }
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (batch, _, height, width) = input.dim();
        Ok(Array4::from_elem((batch, 1, height, width), self.logit))
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
