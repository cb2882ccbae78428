//! Post-segmentation compositing
//!
//! Turns an RGB image and its opacity mask into the final output:
//! apply the mask as alpha, crop to the visible content with padding, flatten
//! onto an opaque background, and stamp the watermark in the bottom-right
//! corner. The stage order is fixed.

use crate::config::CompositorConfig;
use crate::error::{BgStudioError, Result};
use crate::types::{BoundingBox, SegmentationMask};
use crate::watermark::{bottom_right_position, Watermark};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use log::warn;
use tracing::{debug, span, Level};

/// Attach a mask as the alpha channel of an RGB image
///
/// Color channels are copied untouched; alpha is the mask value.
///
/// # Errors
/// - Mask dimensions differ from the image dimensions
pub fn apply_mask(image: &RgbImage, mask: &SegmentationMask) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions {
        return Err(BgStudioError::dimension_mismatch(
            image.dimensions(),
            mask.dimensions,
        ));
    }

    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for (pixel, &alpha) in image.pixels().zip(mask.data.iter()) {
        data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], alpha]);
    }

    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| BgStudioError::processing("Failed to assemble RGBA image"))
}

/// Tightest box around every pixel with non-zero alpha
///
/// Returns `None` for a fully transparent image.
#[must_use]
pub fn content_bbox(image: &RgbaImage) -> Option<BoundingBox> {
    let (width, height) = image.dimensions();
    let mut left = width;
    let mut top = height;
    let mut right = 0;
    let mut bottom = 0;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] > 0 {
            left = left.min(x);
            top = top.min(y);
            right = right.max(x + 1);
            bottom = bottom.max(y + 1);
        }
    }

    (right > left && bottom > top).then(|| BoundingBox::new(left, top, right, bottom))
}

/// Expand a content box by `padding_pct` of its own size on each axis,
/// clamped to an image of `dimensions`
#[must_use]
pub fn padded_region(bbox: &BoundingBox, padding_pct: f64, dimensions: (u32, u32)) -> BoundingBox {
    let pad_w = (f64::from(bbox.width()) * padding_pct).floor() as u32;
    let pad_h = (f64::from(bbox.height()) * padding_pct).floor() as u32;
    bbox.expand_clamped(pad_w, pad_h, dimensions.0, dimensions.1)
}

/// Crop to the visible content plus padding
///
/// A fully transparent image is returned unchanged.
#[must_use]
pub fn crop_to_content(image: &RgbaImage, padding_pct: f64) -> RgbaImage {
    match content_bbox(image) {
        Some(bbox) => crop(image, &padded_region(&bbox, padding_pct, image.dimensions())),
        None => image.clone(),
    }
}

fn crop(image: &RgbaImage, region: &BoundingBox) -> RgbaImage {
    image::imageops::crop_imm(
        image,
        region.left,
        region.top,
        region.width(),
        region.height(),
    )
    .to_image()
}

#[inline]
fn blend_channel(src: u8, bg: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    ((u32::from(src) * a + u32::from(bg) * (255 - a) + 127) / 255) as u8
}

#[inline]
fn blend_pixel(src: &Rgba<u8>, bg: &Rgb<u8>) -> Rgb<u8> {
    let alpha = src[3];
    Rgb([
        blend_channel(src[0], bg[0], alpha),
        blend_channel(src[1], bg[1], alpha),
        blend_channel(src[2], bg[2], alpha),
    ])
}

/// Flatten an RGBA image onto an opaque background of the same size
#[must_use]
pub fn composite_on_background(image: &RgbaImage, background: [u8; 3]) -> RgbImage {
    let background = Rgb(background);
    let (width, height) = image.dimensions();
    let mut canvas = RgbImage::new(width, height);
    for (out, src) in canvas.pixels_mut().zip(image.pixels()) {
        *out = blend_pixel(src, &background);
    }
    canvas
}

/// Blend the watermark into the bottom-right corner of `image`
///
/// Returns whether anything was stamped. An unavailable watermark logs a
/// warning and leaves the image untouched. Placement that would fall off the
/// top-left edge is clamped to the origin and the overflow is clipped.
pub fn stamp_watermark(
    image: &mut RgbImage,
    watermark: &Watermark,
    max_width_ratio: f64,
    margin: u32,
) -> bool {
    if let Watermark::Unavailable(reason) = watermark {
        warn!("Skipping watermark: {}", reason);
        return false;
    }

    let Some(mark) = watermark.scaled_for(image.width(), max_width_ratio) else {
        debug!(width = image.width(), "Image too narrow for a watermark");
        return false;
    };

    let (x0, y0) = bottom_right_position(image.dimensions(), mark.dimensions(), margin);
    for (mx, my, src) in mark.enumerate_pixels() {
        if let Some(dst) = image.get_pixel_mut_checked(x0 + mx, y0 + my) {
            *dst = blend_pixel(src, dst);
        }
    }
    true
}

/// Output of the compositing stages
#[derive(Debug, Clone)]
pub struct CompositeOutput {
    /// Flattened, cropped and watermarked image
    pub image: RgbImage,
    /// Content box before padding, in input coordinates
    pub content_bbox: Option<BoundingBox>,
    /// Crop region actually applied, in input coordinates
    pub crop_region: Option<BoundingBox>,
    pub watermarked: bool,
}

/// Runs the compositing stages with a fixed configuration and watermark
#[derive(Debug, Clone)]
pub struct Compositor {
    config: CompositorConfig,
    watermark: Watermark,
}

impl Compositor {
    /// Create a compositor
    ///
    /// # Errors
    /// - Invalid configuration, see [`CompositorConfig::validate`]
    pub fn new(config: CompositorConfig, watermark: Watermark) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, watermark })
    }

    /// Compositor that never stamps a watermark
    ///
    /// # Errors
    /// - Invalid configuration, see [`CompositorConfig::validate`]
    pub fn without_watermark(config: CompositorConfig) -> Result<Self> {
        Self::new(
            config,
            Watermark::Unavailable("watermarking disabled".to_string()),
        )
    }

    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    #[must_use]
    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Run mask application, crop, background compositing and watermarking
    ///
    /// # Errors
    /// - Mask dimensions differ from the image dimensions
    pub fn composite(&self, image: &RgbImage, mask: &SegmentationMask) -> Result<CompositeOutput> {
        let cutout = {
            let _span = span!(Level::DEBUG, "apply_mask").entered();
            apply_mask(image, mask)?
        };

        let content = content_bbox(&cutout);
        let region = content
            .map(|bbox| padded_region(&bbox, self.config.padding_pct, cutout.dimensions()));
        let cropped = {
            let _span = span!(Level::DEBUG, "crop_to_content", bbox = ?content).entered();
            match &region {
                Some(region) => crop(&cutout, region),
                None => {
                    debug!("Image is fully transparent, skipping crop");
                    cutout
                },
            }
        };

        let mut flattened = {
            let _span = span!(Level::DEBUG, "composite_on_background").entered();
            composite_on_background(&cropped, self.config.background_color)
        };

        let watermarked = if self.watermark.is_available() {
            let _span = span!(Level::DEBUG, "stamp_watermark").entered();
            stamp_watermark(
                &mut flattened,
                &self.watermark,
                self.config.watermark_max_width_ratio,
                self.config.watermark_margin,
            )
        } else {
            false
        };

        Ok(CompositeOutput {
            image: flattened,
            content_bbox: content,
            crop_region: region,
            watermarked,
        })
    }
}
