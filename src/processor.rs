//! Unified background removal processor
//!
//! [`BackgroundRemovalProcessor`] owns the immutable processing context (the
//! segmentation model, the compositor and its watermark) and is shared by the
//! HTTP server and the CLI, so every front-end
//! produces identical output.

use crate::{
    compositor::{apply_mask, Compositor},
    config::{AppConfig, OutputMode},
    error::Result,
    inference::SegmentationModel,
    services::io::{decode_image, load_image, png_output_path},
    types::{ProcessingMetadata, ProcessingTimings, RemovalResult, SegmentationMask},
    watermark::Watermark,
};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info as trace_info, instrument, span, Level};

/// Background removal pipeline with a shared model
///
/// Cloning is cheap: the model and watermark are reference counted.
#[derive(Clone)]
pub struct BackgroundRemovalProcessor {
    model: Arc<dyn SegmentationModel>,
    compositor: Compositor,
    mode: OutputMode,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("model", &self.model.name())
            .field("compositor", &self.compositor)
            .field("mode", &self.mode)
            .finish()
    }
}

impl BackgroundRemovalProcessor {
    #[must_use]
    pub fn new(model: Arc<dyn SegmentationModel>, compositor: Compositor, mode: OutputMode) -> Self {
        Self {
            model,
            compositor,
            mode,
        }
    }

    /// Build a processor from application configuration
    ///
    /// The watermark is loaded here, once; a missing asset only logs a warning.
    ///
    /// # Errors
    /// - Invalid compositor configuration
    pub fn from_config(model: Arc<dyn SegmentationModel>, config: &AppConfig) -> Result<Self> {
        let compositor = match &config.watermark_path {
            Some(path) => Compositor::new(config.compositor.clone(), Watermark::load(path))?,
            None => Compositor::without_watermark(config.compositor.clone())?,
        };
        Ok(Self::new(model, compositor, config.server.default_mode))
    }

    /// Same processor with a different default output mode
    #[must_use]
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    #[must_use]
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Remove the background of an image using the default output mode
    ///
    /// # Errors
    /// - Segmentation failures
    /// - Mask resampling or compositing errors
    pub fn process_image(&self, image: &DynamicImage) -> Result<RemovalResult> {
        self.process_image_with_mode(image, self.mode)
    }

    /// Remove the background of an image with an explicit output mode
    ///
    /// # Errors
    /// - Segmentation failures
    /// - Mask resampling or compositing errors
    #[instrument(
        skip(self, image),
        fields(
            model = %self.model.name(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image_with_mode(
        &self,
        image: &DynamicImage,
        mode: OutputMode,
    ) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let original_dimensions = image.dimensions();

        trace_info!(mode = ?mode, "🎯 Starting image processing");

        let raw_mask = {
            let _span = span!(Level::INFO, "segmentation", model = %self.model.name()).entered();
            let start = Instant::now();
            let mask = self.model.segment(image)?;
            timings.segmentation_ms = start.elapsed().as_millis() as u64;
            log::debug!(
                "Mask {}x{}, {:.1}% foreground",
                mask.dimensions.0,
                mask.dimensions.1,
                mask.foreground_ratio() * 100.0
            );
            mask
        };

        let mask = {
            let _span = span!(
                Level::DEBUG,
                "mask_resample",
                from = %format!("{}x{}", raw_mask.dimensions.0, raw_mask.dimensions.1)
            )
            .entered();
            let start = Instant::now();
            let mask = Self::fit_mask(raw_mask, original_dimensions)?;
            timings.mask_resample_ms = start.elapsed().as_millis() as u64;
            mask
        };

        let rgb = image.to_rgb8();
        let mut metadata = ProcessingMetadata::new(self.model.name().to_string());
        let compositing_start = Instant::now();
        let (output, bounding_box) = match mode {
            OutputMode::Cutout => {
                let _span = span!(Level::DEBUG, "cutout").entered();
                (DynamicImage::ImageRgba8(apply_mask(&rgb, &mask)?), None)
            },
            OutputMode::Composite => {
                let _span = span!(Level::DEBUG, "composite").entered();
                let composite = self.compositor.composite(&rgb, &mask)?;
                metadata.watermarked = composite.watermarked;
                (
                    DynamicImage::ImageRgb8(composite.image),
                    composite.content_bbox,
                )
            },
        };
        timings.compositing_ms = compositing_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        trace_info!(
            output = %format!("{}x{}", output.width(), output.height()),
            "✅ {}",
            timings.summary()
        );

        metadata.timings = timings;
        Ok(RemovalResult {
            image: output,
            mask,
            bounding_box,
            original_dimensions,
            metadata,
        })
    }

    /// Decode image bytes and process them
    ///
    /// # Errors
    /// - Undecodable image data (`Image` error)
    /// - See [`BackgroundRemovalProcessor::process_image`]
    pub fn process_bytes(&self, image_bytes: &[u8]) -> Result<RemovalResult> {
        let image = decode_image(image_bytes)?;
        self.process_image(&image)
    }

    /// Decode image bytes and process them with an explicit mode
    ///
    /// # Errors
    /// - See [`BackgroundRemovalProcessor::process_bytes`]
    pub fn process_bytes_with_mode(
        &self,
        image_bytes: &[u8],
        mode: OutputMode,
    ) -> Result<RemovalResult> {
        let image = decode_image(image_bytes)?;
        self.process_image_with_mode(&image, mode)
    }

    /// Process an image file and write `<stem>.png` next to it, or into
    /// `output_dir` when given
    ///
    /// Returns the path written.
    ///
    /// # Errors
    /// - Unreadable input
    /// - Processing failures
    /// - Output write failures
    pub fn process_file<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let input_path = input_path.as_ref();
        let image = load_image(input_path)?;
        let result = self.process_image(&image)?;
        let output_path = png_output_path(input_path, output_dir);
        result.save_png(&output_path)?;
        log::info!(
            "Processed {} -> {}",
            input_path.display(),
            output_path.display()
        );
        Ok(output_path)
    }

    fn fit_mask(mask: SegmentationMask, dimensions: (u32, u32)) -> Result<SegmentationMask> {
        if mask.dimensions == dimensions {
            Ok(mask)
        } else {
            mask.resize(dimensions.0, dimensions.1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackend, MockSegmenter};
    use crate::config::CompositorConfig;
    use crate::error::BgStudioError;
    use crate::inference::OnnxSegmenter;
    use crate::models::PreprocessingConfig;
    use crate::types::BoundingBox;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn photo(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 200) as u8, (y % 200) as u8, 90])
        }))
    }

    fn processor(model: MockSegmenter, watermark: Option<RgbaImage>) -> BackgroundRemovalProcessor {
        let compositor = match watermark {
            Some(mark) => Compositor::new(CompositorConfig::default(), Watermark::from_image(mark)),
            None => Compositor::without_watermark(CompositorConfig::default()),
        }
        .unwrap();
        BackgroundRemovalProcessor::new(Arc::new(model), compositor, OutputMode::Composite)
    }

    #[test]
    fn test_composite_mode_crops_and_flattens() {
        let processor = processor(MockSegmenter::with_rect((0.2, 1.0 / 6.0, 0.8, 5.0 / 6.0)), None);
        let result = processor.process_image(&photo(500, 300)).unwrap();

        assert_eq!(result.original_dimensions, (500, 300));
        assert_eq!(result.bounding_box, Some(BoundingBox::new(100, 50, 400, 250)));
        assert_eq!(result.dimensions(), (360, 240));
        assert!(matches!(result.image, DynamicImage::ImageRgb8(_)));
        assert_eq!(result.mask.dimensions, (500, 300));
        assert_eq!(result.metadata.model_name, "mock-segmenter");
        assert!(!result.metadata.watermarked);
    }

    #[test]
    fn test_cutout_mode_keeps_size_and_alpha() {
        let processor = processor(MockSegmenter::with_rect((0.25, 0.25, 0.75, 0.75)), None)
            .with_mode(OutputMode::Cutout);
        let result = processor.process_image(&photo(40, 40)).unwrap();

        assert_eq!(result.dimensions(), (40, 40));
        let rgba = result.image.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(20, 20)[3], 255);
        assert!(result.bounding_box.is_none());
    }

    #[test]
    fn test_low_resolution_mask_is_resampled() {
        let model = MockSegmenter::with_rect((0.0, 0.0, 1.0, 1.0)).at_resolution(32, 32);
        let processor = processor(model, None);
        let image = photo(100, 60);
        let result = processor.process_image(&image).unwrap();

        assert_eq!(result.mask.dimensions, (100, 60));
        // Fully opaque mask: composite equals the input
        assert_eq!(result.image.to_rgb8(), image.to_rgb8());
    }

    #[test]
    fn test_watermark_applied_in_composite_mode() {
        let mark = RgbaImage::from_pixel(1000, 500, Rgba([0, 0, 0, 255]));
        let processor = processor(MockSegmenter::with_rect((0.2, 1.0 / 6.0, 0.8, 5.0 / 6.0)), Some(mark));
        let result = processor.process_image(&photo(500, 300)).unwrap();

        assert!(result.metadata.watermarked);
        let rgb = result.image.to_rgb8();
        assert_eq!(rgb.get_pixel(300, 200).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(2, 2).0, [255, 255, 255]);
    }

    #[test]
    fn test_empty_mask_returns_white_canvas() {
        let processor = processor(MockSegmenter::empty(), None);
        let result = processor.process_image(&photo(30, 20)).unwrap();
        assert_eq!(result.dimensions(), (30, 20));
        assert!(result.image.to_rgb8().pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_segmentation_failure_propagates() {
        let processor = processor(MockSegmenter::failing(), None);
        let err = processor.process_image(&photo(10, 10)).unwrap_err();
        assert!(matches!(err, BgStudioError::Inference(_)));
    }

    #[test]
    fn test_process_bytes_rejects_garbage() {
        let model = MockSegmenter::with_rect((0.0, 0.0, 1.0, 1.0));
        let processor = processor(model.clone(), None);
        let err = processor.process_bytes(b"\x00\x01garbage").unwrap_err();
        assert!(matches!(err, BgStudioError::Image(_)));
        assert!(model.calls().is_empty());
    }

    #[test]
    fn test_process_file_writes_png_next_to_input() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("portrait.jpg");
        photo(50, 40).save(&input).unwrap();

        let processor = processor(MockSegmenter::with_rect((0.0, 0.0, 1.0, 1.0)), None);
        let output = processor.process_file(&input, None).unwrap();
        assert_eq!(output, temp_dir.path().join("portrait.png"));
        let written = image::open(&output).unwrap();
        assert_eq!(written.dimensions(), (50, 40));

        let out_dir = temp_dir.path().join("out");
        let output = processor.process_file(&input, Some(&out_dir)).unwrap();
        assert_eq!(output, out_dir.join("portrait.png"));
        assert!(output.exists());
    }

    #[test]
    fn test_onnx_segmenter_through_processor() {
        let preprocessing = PreprocessingConfig {
            target_size: 16,
            ..PreprocessingConfig::default()
        };
        let segmenter = OnnxSegmenter::new(MockBackend::new(16, 20.0), preprocessing, true);
        let compositor = Compositor::without_watermark(CompositorConfig::default()).unwrap();
        let processor =
            BackgroundRemovalProcessor::new(Arc::new(segmenter), compositor, OutputMode::Cutout);

        let result = processor.process_image(&photo(24, 12)).unwrap();
        assert_eq!(result.mask.dimensions, (24, 12));
        assert!(result.mask.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_from_config_tolerates_missing_watermark() {
        let config = AppConfig {
            watermark_path: Some(PathBuf::from("/no/such/logo-t.png")),
            ..AppConfig::default()
        };
        let processor = BackgroundRemovalProcessor::from_config(
            Arc::new(MockSegmenter::with_rect((0.1, 0.1, 0.9, 0.9))),
            &config,
        )
        .unwrap();
        assert!(!processor.compositor().watermark().is_available());
        let result = processor.process_image(&photo(64, 64)).unwrap();
        assert!(!result.metadata.watermarked);
    }
}
