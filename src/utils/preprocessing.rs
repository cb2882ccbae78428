//! Image to tensor conversion for segmentation networks

use crate::{
    error::{BgStudioError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, RgbImage};
use ndarray::{Array4, Axis};

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image for model inference
    ///
    /// This function handles:
    /// - RGB conversion
    /// - Resize to a `target_size` square (aspect ratio is not preserved)
    /// - Scaling to [0, 1] and per-channel normalization
    /// - NCHW layout with a batch of one
    ///
    /// # Errors
    /// - Zero target size or empty input image
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let target_size = preprocessing_config.target_size;
        if target_size == 0 {
            return Err(BgStudioError::processing("Target size must be non-zero"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(BgStudioError::processing("Cannot preprocess an empty image"));
        }

        let rgb_image = image.to_rgb8();
        let resized = if rgb_image.dimensions() == (target_size, target_size) {
            rgb_image
        } else {
            image::imageops::resize(
                &rgb_image,
                target_size,
                target_size,
                image::imageops::FilterType::Triangle,
            )
        };

        Ok(Self::canvas_to_tensor(&resized, preprocessing_config))
    }

    /// Convert an RGB canvas to a normalized NCHW tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let stddev = preprocessing_config.normalization_std;

        for (c, (&m, &s)) in mean.iter().zip(stddev.iter()).enumerate() {
            let mut plane = tensor.index_axis_mut(Axis(1), c);
            for (value, pixel) in plane.iter_mut().zip(canvas.pixels()) {
                let channel = pixel.0.get(c).copied().unwrap_or(0);
                *value = (f32::from(channel) / 255.0 - m) / s;
            }
        }

        tensor
    }
}
