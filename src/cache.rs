//! On-disk cache for downloaded segmentation models
//!
//! Models live in `<cache root>/models/<model id>/onnx/model.onnx`. The root is
//! `$BGSTUDIO_CACHE_DIR` when set, otherwise the platform cache directory.

use crate::error::{BgStudioError, Result};
use crate::models::MODEL_FILE;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "BGSTUDIO_CACHE_DIR";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Size of the ONNX file in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the default cache, creating the directory if needed
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Self::open(cache_dir)
    }

    /// Open a cache rooted at a custom directory (models go in `<dir>/models`)
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        Self::open(cache_dir.join("models"))
    }

    fn open(cache_dir: PathBuf) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                BgStudioError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgStudioError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join("bgstudio")
            .join("models"))
    }

    /// Generate a filesystem-safe model ID from a URL
    ///
    /// ```
    /// use bgstudio::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://huggingface.co/onnx-community/BiRefNet-ONNX");
    /// assert_eq!(id, "onnx-community--BiRefNet-ONNX");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if let Some(repo) = url.strip_prefix(prefix) {
            repo.trim_end_matches('/').replace('/', "--")
        } else {
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// Directory holding a model (may not exist)
    #[must_use]
    pub fn model_dir(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// ONNX file of a model (may not exist)
    #[must_use]
    pub fn model_file(&self, model_id: &str) -> PathBuf {
        self.model_dir(model_id).join(MODEL_FILE)
    }

    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        !model_id.is_empty() && self.model_file(model_id).is_file()
    }

    /// List all cached models, sorted by ID
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn list(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgStudioError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(model_id) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };
            // In-progress downloads are staged in hidden directories
            if model_id.starts_with('.') {
                continue;
            }

            let model_file = path.join(MODEL_FILE);
            match fs::metadata(&model_file) {
                Ok(metadata) if metadata.is_file() => models.push(CachedModelInfo {
                    model_id,
                    path,
                    size_bytes: metadata.len(),
                }),
                _ => log::debug!("Skipping incomplete model directory: {}", path.display()),
            }
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove one cached model; returns whether it existed
    ///
    /// # Errors
    /// - Failed to remove the model directory
    pub fn clear_model(&self, model_id: &str) -> Result<bool> {
        let model_dir = self.model_dir(model_id);
        if !model_dir.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model_id);
        fs::remove_dir_all(&model_dir)
            .map_err(|e| BgStudioError::file_io_error("remove cached model", &model_dir, &e))?;
        Ok(true)
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS.get(unit_index).unwrap_or(&"B");
    if unit_index == 0 {
        format!("{} {}", bytes, unit)
    } else {
        format!("{:.1} {}", size, unit)
    }
}
