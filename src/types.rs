//! Core types for background removal operations

use crate::error::{BgStudioError, Result};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest rectangle enclosing every non-transparent pixel
///
/// `right` and `bottom` are exclusive, so `left < right <= width` and
/// `top < bottom <= height` always hold for a box produced from an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Grow by `pad_w`/`pad_h` on each side, clamped to a `width`x`height` image
    #[must_use]
    pub fn expand_clamped(&self, pad_w: u32, pad_h: u32, width: u32, height: u32) -> Self {
        Self {
            left: self.left.saturating_sub(pad_w),
            top: self.top.saturating_sub(pad_h),
            right: self.right.saturating_add(pad_w).min(width),
            bottom: self.bottom.saturating_add(pad_h).min(height),
        }
    }

    /// Whether `other` lies entirely inside this box
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Single-channel opacity mask (0 = transparent, 255 = opaque)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Row-major mask values
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a mask from raw values
    ///
    /// # Errors
    /// - `data.len()` is not `width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgStudioError::processing(format!(
                "Mask data has {} values, expected {} for {}x{}",
                data.len(),
                expected,
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Create a mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self {
            data: image.as_raw().clone(),
            dimensions: image.dimensions(),
        }
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - Inconsistent data length (only possible after manual field edits)
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone())
            .ok_or_else(|| BgStudioError::processing("Failed to create image from mask data"))
    }

    /// Resample to new dimensions with a bicubic filter
    ///
    /// # Errors
    /// - See [`SegmentationMask::to_image`]
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<Self> {
        if self.dimensions == (new_width, new_height) {
            return Ok(self.clone());
        }
        let resized = image::imageops::resize(
            &self.to_image()?,
            new_width,
            new_height,
            image::imageops::FilterType::CatmullRom,
        );
        Ok(Self::from_image(&resized))
    }

    /// Fraction of pixels above half opacity
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&v| v > 127).count();
        foreground as f32 / self.data.len() as f32
    }

    /// Save mask as a grayscale PNG, creating parent directories
    ///
    /// # Errors
    /// - Encoding or file write failures
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::services::io::save_png(&DynamicImage::ImageLuma8(self.to_image()?), path)
    }
}

/// Per-stage timing breakdown in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub segmentation_ms: u64,
    pub mask_resample_ms: u64,
    pub compositing_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent in segmentation
    #[must_use]
    pub fn segmentation_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.segmentation_ms as f64 / self.total_ms as f64
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Segmentation: {}ms ({:.1}%) | Mask resample: {}ms | Compositing: {}ms",
            self.total_ms,
            self.segmentation_ms,
            self.segmentation_ratio() * 100.0,
            self.mask_resample_ms,
            self.compositing_ms
        )
    }
}

/// Metadata about the processing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub timings: ProcessingTimings,
    pub model_name: String,
    pub processed_at: DateTime<Utc>,
    /// Whether a watermark was stamped onto the output
    pub watermarked: bool,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(model_name: String) -> Self {
        Self {
            timings: ProcessingTimings::default(),
            model_name,
            processed_at: Utc::now(),
            watermarked: false,
        }
    }
}

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Final image: RGB for composite output, RGBA for cutouts
    pub image: DynamicImage,

    /// Mask resampled to the original image size
    pub mask: SegmentationMask,

    /// Content box in original image coordinates, if any pixel is visible
    pub bounding_box: Option<BoundingBox>,

    pub original_dimensions: (u32, u32),

    pub metadata: ProcessingMetadata,
}

impl RemovalResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Encode the image as PNG bytes
    ///
    /// # Errors
    /// - PNG encoding failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        crate::services::io::encode_png(&self.image)
    }

    /// Save the image as PNG, creating parent directories
    ///
    /// # Errors
    /// - Encoding or file write failures
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::services::io::save_png(&self.image, path)
    }
}
