//! Backend implementations for different inference engines
//!
//! - Tract backend (pure Rust, no external dependencies)
//! - ONNX Runtime backend (GPU acceleration)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::cache::ModelCache;
use crate::config::{BackendType, ModelConfig};
use crate::error::{BgStudioError, Result};
use crate::inference::SegmentationModel;
use std::sync::Arc;

/// Backends compiled into this build
#[must_use]
pub fn available_backends() -> Vec<BackendType> {
    let mut backends = Vec::new();
    #[cfg(feature = "tract")]
    backends.push(BackendType::Tract);
    #[cfg(feature = "onnx")]
    backends.push(BackendType::Onnx);
    backends
}

/// Execution providers of each compiled backend as `(name, available, description)`
#[must_use]
pub fn provider_diagnostics() -> Vec<(BackendType, Vec<(String, bool, String)>)> {
    available_backends()
        .into_iter()
        .map(|backend| {
            let providers = match backend {
                #[cfg(feature = "tract")]
                BackendType::Tract => TractBackend::list_providers(),
                #[cfg(feature = "onnx")]
                BackendType::Onnx => OnnxBackend::list_providers(),
                #[allow(unreachable_patterns)]
                _ => Vec::new(),
            };
            (backend, providers)
        })
        .collect()
}

/// Load the configured model and wrap it in a segmenter
///
/// # Errors
/// - Backend not compiled into this build
/// - Model file missing or not cached
/// - Backend initialization failures
pub fn create_segmenter(
    config: &ModelConfig,
    cache: &ModelCache,
) -> Result<Arc<dyn SegmentationModel>> {
    if !available_backends().contains(&config.backend) {
        return Err(BgStudioError::invalid_config(format!(
            "Backend '{}' is not available in this build (enable the '{}' feature)",
            config.backend, config.backend
        )));
    }

    let model_data = config.source.load_bytes(cache)?;
    let name = config.source.display_name();
    log::debug!(
        "Creating {} segmenter for {} ({} bytes)",
        config.backend,
        name,
        model_data.len()
    );

    match config.backend {
        BackendType::Tract => tract_segmenter(config, &model_data, name),
        BackendType::Onnx => onnx_segmenter(config, &model_data, name),
    }
}

#[cfg(feature = "tract")]
fn tract_segmenter(
    config: &ModelConfig,
    model_data: &[u8],
    name: String,
) -> Result<Arc<dyn SegmentationModel>> {
    let backend = TractBackend::from_bytes(model_data, name, config.preprocessing.target_size)?;
    Ok(Arc::new(crate::inference::OnnxSegmenter::new(
        backend,
        config.preprocessing.clone(),
        config.apply_sigmoid,
    )))
}

#[cfg(not(feature = "tract"))]
fn tract_segmenter(
    _config: &ModelConfig,
    _model_data: &[u8],
    _name: String,
) -> Result<Arc<dyn SegmentationModel>> {
    Err(BgStudioError::invalid_config(
        "Tract backend not compiled in (enable the 'tract' feature)",
    ))
}

#[cfg(feature = "onnx")]
fn onnx_segmenter(
    config: &ModelConfig,
    model_data: &[u8],
    name: String,
) -> Result<Arc<dyn SegmentationModel>> {
    let backend = OnnxBackend::from_bytes(
        model_data,
        name,
        config.preprocessing.target_size,
        config.execution_provider,
        config.intra_threads,
    )?;
    Ok(Arc::new(crate::inference::OnnxSegmenter::new(
        backend,
        config.preprocessing.clone(),
        config.apply_sigmoid,
    )))
}

#[cfg(not(feature = "onnx"))]
fn onnx_segmenter(
    _config: &ModelConfig,
    _model_data: &[u8],
    _name: String,
) -> Result<Arc<dyn SegmentationModel>> {
    Err(BgStudioError::invalid_config(
        "ONNX backend not compiled in (enable the 'onnx' feature)",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSource;
    use tempfile::TempDir;

    #[test]
    fn test_missing_model_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let config = ModelConfig {
            source: ModelSource::Cached("nobody--nothing".to_string()),
            backend: available_backends()
                .first()
                .copied()
                .unwrap_or(BackendType::Tract),
            ..ModelConfig::default()
        };

        let err = create_segmenter(&config, &cache).err().unwrap();
        if available_backends().is_empty() {
            assert!(matches!(err, BgStudioError::InvalidConfig(_)));
        } else {
            assert!(matches!(err, BgStudioError::Model(_)));
        }
    }

    #[test]
    fn test_provider_diagnostics_cover_compiled_backends() {
        let diagnostics = provider_diagnostics();
        let backends: Vec<_> = diagnostics.iter().map(|(backend, _)| *backend).collect();
        assert_eq!(backends, available_backends());
        for (_, providers) in &diagnostics {
            assert_eq!(providers[0].0, "CPU");
            assert!(providers[0].1);
        }
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_backend_requires_feature() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let config = ModelConfig {
            backend: BackendType::Onnx,
            ..ModelConfig::default()
        };
        let err = create_segmenter(&config, &cache).err().unwrap();
        assert!(err.to_string().contains("onnx"));
    }
}
