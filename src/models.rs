//! Model sources and preprocessing metadata

use crate::cache::ModelCache;
use crate::error::{BgStudioError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default BiRefNet ONNX export on `HuggingFace`
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/onnx-community/BiRefNet-ONNX";

/// ONNX file inside a downloaded model repository
pub const MODEL_FILE: &str = "onnx/model.onnx";

/// Where the ONNX model bytes come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ModelSource {
    /// ONNX file on the local filesystem
    Path(PathBuf),
    /// Model downloaded into the cache, by model ID
    Cached(String),
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Cached(ModelCache::url_to_model_id(DEFAULT_MODEL_URL))
    }
}

impl ModelSource {
    /// Interpret a CLI value: an existing path, a URL or a cached model ID
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("https://") || value.starts_with("http://") {
            Self::Cached(ModelCache::url_to_model_id(value))
        } else if Path::new(value).exists() {
            Self::Path(PathBuf::from(value))
        } else {
            Self::Cached(value.to_string())
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => format!(
                "file:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
            Self::Cached(model_id) => format!("cached:{}", model_id),
        }
    }

    /// Resolve the ONNX file location
    ///
    /// # Errors
    /// - The file does not exist
    /// - The cached model has not been downloaded
    pub fn resolve(&self, cache: &ModelCache) -> Result<PathBuf> {
        let path = match self {
            Self::Path(path) => path.clone(),
            Self::Cached(model_id) => {
                if !cache.is_model_cached(model_id) {
                    return Err(BgStudioError::model(format!(
                        "Model '{}' is not cached. Run `bgstudio download` first.",
                        model_id
                    )));
                }
                cache.model_file(model_id)
            },
        };

        if !path.is_file() {
            return Err(BgStudioError::model(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Read the ONNX model bytes
    ///
    /// # Errors
    /// - Resolution failures, see [`ModelSource::resolve`]
    /// - File read errors
    pub fn load_bytes(&self, cache: &ModelCache) -> Result<Vec<u8>> {
        let path = self.resolve(cache)?;
        fs::read(&path).map_err(|e| BgStudioError::file_io_error("read model file", &path, &e))
    }
}

/// Input preprocessing parameters for the segmentation network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square input resolution in pixels
    pub target_size: u32,
    /// Per-channel mean subtracted after scaling to [0, 1]
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation divided out after mean subtraction
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        // ImageNet statistics at BiRefNet's 1024x1024 training resolution
        Self {
            target_size: 1024,
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW
    pub output_shape: (usize, usize, usize, usize),
}

impl ModelInfo {
    /// Describe a single-image, single-mask network at the given resolution
    #[must_use]
    pub fn square(name: String, size_bytes: usize, size: u32) -> Self {
        let size = size as usize;
        Self {
            name,
            size_bytes,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_model_source() {
        assert_eq!(
            ModelSource::parse("https://huggingface.co/onnx-community/BiRefNet-ONNX"),
            ModelSource::Cached("onnx-community--BiRefNet-ONNX".to_string())
        );
        assert_eq!(
            ModelSource::parse("some-model-id"),
            ModelSource::Cached("some-model-id".to_string())
        );
    }

    #[test]
    fn test_resolve_missing_cached_model() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let source = ModelSource::Cached("missing--model".to_string());

        let err = source.resolve(&cache).unwrap_err();
        assert!(matches!(err, BgStudioError::Model(_)));
        assert!(err.to_string().contains("bgstudio download"));
    }

    #[test]
    fn test_resolve_path_source() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let model_path = temp_dir.path().join("model.onnx");
        fs::write(&model_path, b"onnx").unwrap();

        let source = ModelSource::Path(model_path.clone());
        assert_eq!(source.resolve(&cache).unwrap(), model_path);
        assert_eq!(source.load_bytes(&cache).unwrap(), b"onnx");
        assert_eq!(source.display_name(), "file:model.onnx");
    }

    #[test]
    fn test_default_preprocessing() {
        let config = PreprocessingConfig::default();
        assert_eq!(config.target_size, 1024);
        assert_eq!(config.normalization_mean, [0.485, 0.456, 0.406]);
        assert_eq!(config.normalization_std, [0.229, 0.224, 0.225]);
    }
}
