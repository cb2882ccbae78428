//! Shared helpers for integration tests

#![allow(dead_code)]

use bgstudio::{
    config::{AppConfig, CompositorConfig, OutputMode},
    error::Result,
    inference::SegmentationModel,
    types::SegmentationMask,
    BackgroundRemovalProcessor, Compositor, Watermark,
};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;
use std::sync::Arc;

/// Segmenter that marks a fixed pixel rectangle as foreground
///
/// The rectangle is given in input pixel coordinates as
/// `(left, top, right, bottom)` with exclusive right and bottom.
#[derive(Debug, Clone)]
pub struct RectSegmenter {
    rect: Option<(u32, u32, u32, u32)>,
}

impl RectSegmenter {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            rect: Some((left, top, right, bottom)),
        }
    }

    /// Everything is background
    pub fn empty() -> Self {
        Self { rect: None }
    }
}

impl SegmentationModel for RectSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask> {
        let (width, height) = image.dimensions();
        let mut data = vec![0u8; (width * height) as usize];
        if let Some((left, top, right, bottom)) = self.rect {
            for y in top..bottom.min(height) {
                for x in left..right.min(width) {
                    data[(y * width + x) as usize] = 255;
                }
            }
        }
        SegmentationMask::new(data, (width, height))
    }

    fn name(&self) -> &str {
        "rect-segmenter"
    }
}

/// Gradient test photo so crops are distinguishable
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Solid red watermark asset
pub fn red_watermark(width: u32, height: u32) -> Watermark {
    Watermark::from_image(RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255])))
}

/// Write a solid red watermark PNG to disk
pub fn write_watermark_png(path: &Path, width: u32, height: u32) {
    RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]))
        .save(path)
        .expect("Failed to write watermark asset");
}

/// Processor with the default compositor settings and the given watermark
pub fn processor_with(segmenter: RectSegmenter, watermark: Watermark) -> BackgroundRemovalProcessor {
    let compositor =
        Compositor::new(CompositorConfig::default(), watermark).expect("valid compositor config");
    BackgroundRemovalProcessor::new(Arc::new(segmenter), compositor, OutputMode::Composite)
}

/// Processor built through [`AppConfig`] with no watermark
pub fn unwatermarked_processor(segmenter: RectSegmenter) -> BackgroundRemovalProcessor {
    let config = AppConfig {
        watermark_path: None,
        ..AppConfig::default()
    };
    BackgroundRemovalProcessor::from_config(Arc::new(segmenter), &config)
        .expect("valid default config")
}
