//! Watermark asset loading and placement
//!
//! The asset is loaded once at startup. A missing or undecodable file is not
//! fatal: the watermark is recorded as unavailable and every stamp becomes a
//! no-op with a warning.

use crate::error::{BgStudioError, Result};
use crate::services::io::load_image;
use image::imageops::FilterType;
use image::RgbaImage;
use log::warn;
use std::path::Path;
use std::sync::Arc;

/// A watermark that may or may not have loaded
#[derive(Debug, Clone)]
pub enum Watermark {
    /// Decoded RGBA asset, shared read-only
    Loaded(Arc<RgbaImage>),
    /// Loading failed; holds the reason for diagnostics
    Unavailable(String),
}

impl Watermark {
    /// Load a watermark from disk, recording failures instead of returning them
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(image) => {
                log::debug!(
                    "Loaded watermark {} ({}x{})",
                    path.display(),
                    image.width(),
                    image.height()
                );
                Self::Loaded(Arc::new(image))
            },
            Err(e) => {
                warn!("Watermark unavailable: {}", e);
                Self::Unavailable(e.to_string())
            },
        }
    }

    /// Load a watermark from disk, detecting the format from content when the
    /// extension is missing or wrong
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Not a decodable image
    pub fn try_load(path: &Path) -> Result<RgbaImage> {
        let image = load_image(path).map_err(|e| {
            BgStudioError::watermark(format!("failed to load '{}': {}", path.display(), e))
        })?;
        Ok(image.to_rgba8())
    }

    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        Self::Loaded(Arc::new(image))
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Asset resized for a canvas of `canvas_width` pixels
    ///
    /// The asset is downscaled (Lanczos3) when wider than
    /// `floor(canvas_width * max_width_ratio)`, keeping the aspect ratio with a
    /// floored height of at least one pixel. Returns `None` when the watermark
    /// is unavailable or the width cap is zero.
    #[must_use]
    pub fn scaled_for(&self, canvas_width: u32, max_width_ratio: f64) -> Option<Arc<RgbaImage>> {
        let Self::Loaded(asset) = self else {
            return None;
        };

        let max_width = (f64::from(canvas_width) * max_width_ratio).floor() as u32;
        if max_width == 0 || asset.width() == 0 || asset.height() == 0 {
            return None;
        }
        if asset.width() <= max_width {
            return Some(Arc::clone(asset));
        }

        let scale = f64::from(max_width) / f64::from(asset.width());
        let height = ((scale * f64::from(asset.height())).floor() as u32).max(1);
        Some(Arc::new(image::imageops::resize(
            asset.as_ref(),
            max_width,
            height,
            FilterType::Lanczos3,
        )))
    }
}

/// Top-left corner for a `mark` placed `margin` pixels from the bottom-right
/// corner of a `canvas`, clamped to the canvas origin
#[must_use]
pub fn bottom_right_position(canvas: (u32, u32), mark: (u32, u32), margin: u32) -> (u32, u32) {
    let x = canvas.0.saturating_sub(mark.0).saturating_sub(margin);
    let y = canvas.1.saturating_sub(mark.1).saturating_sub(margin);
    (x, y)
}
