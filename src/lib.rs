#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgstudio
//!
//! Background removal for product and portrait photos. A `BiRefNet`
//! segmentation model produces a foreground mask; the compositor then cuts
//! the subject out, crops to its bounding box with padding, flattens it onto
//! a white background and stamps a watermark in the bottom-right corner.
//!
//! ## Features
//!
//! - **Two inference backends**: Tract (pure Rust, default) and ONNX Runtime
//!   (`onnx` feature, CUDA and `CoreML` execution providers)
//! - **Model cache**: downloads the ONNX export from `HuggingFace` once
//! - **HTTP server** (`server` feature): multipart upload and URL endpoints
//! - **HTTP client** and **CLI** (`cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgstudio::{load_processor, AppConfig, ModelCache};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = AppConfig::default();
//! let cache = ModelCache::new()?;
//! let processor = load_processor(&config, &cache)?;
//!
//! let output = processor.process_file("product.jpg", None)?;
//! println!("wrote {}", output.display());
//! # Ok(())
//! # }
//! ```
//!
//! The compositing stages can be used without a model:
//!
//! ```rust
//! use bgstudio::{CompositorConfig, Compositor, SegmentationMask};
//! use image::RgbImage;
//!
//! # fn example() -> bgstudio::Result<()> {
//! let image = RgbImage::new(40, 30);
//! let mask = SegmentationMask::new(vec![255; 40 * 30], (40, 30))?;
//! let compositor = Compositor::without_watermark(CompositorConfig::default())?;
//! let output = compositor.composite(&image, &mask)?;
//! assert_eq!(output.image.dimensions(), (40, 30));
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust backend
//! - `onnx`: ONNX Runtime backend
//! - `server` (default): axum HTTP server
//! - `cli` (default): command-line interface, progress bars and tracing setup
//! - `webp-support` (default): WebP input decoding

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod compositor;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
#[cfg(feature = "server")]
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;
pub mod watermark;

pub use backends::{available_backends, create_segmenter};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use client::{RemovalClient, RemovalOutcome};
pub use compositor::{CompositeOutput, Compositor};
pub use config::{
    AppConfig, BackendType, ClientConfig, CompositorConfig, ExecutionProvider, ModelConfig,
    OutputMode, ServerConfig,
};
pub use download::{validate_model_url, ModelDownloader};
pub use error::{BgStudioError, Result};
pub use inference::{InferenceBackend, OnnxSegmenter, SegmentationModel};
pub use models::{ModelSource, PreprocessingConfig, DEFAULT_MODEL_URL};
pub use processor::BackgroundRemovalProcessor;
pub use services::{encode_png, ImageLoader, ImageSource};
pub use tracing_config::{TracingConfig, TracingFormat};
pub use types::{BoundingBox, ProcessingMetadata, RemovalResult, SegmentationMask};
pub use watermark::Watermark;

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;

/// Load the configured model and build a processor around it
///
/// The model must already be on disk or in the cache; see
/// [`ModelDownloader`] for fetching it.
///
/// # Errors
/// - Model missing or not cached
/// - Backend initialization failures
/// - Invalid compositor configuration
pub fn load_processor(config: &AppConfig, cache: &ModelCache) -> Result<BackgroundRemovalProcessor> {
    let model = create_segmenter(&config.model, cache)?;
    BackgroundRemovalProcessor::from_config(model, config)
}
