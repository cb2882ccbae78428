//! Configuration types for the compositing pipeline and its front-ends
//!
//! Everything here is plain data, built once at process start and shared
//! read-only afterwards. [`AppConfig`] groups the sections and can be loaded
//! from a JSON file with environment variable overrides on top.

use crate::error::{BgStudioError, Result};
use crate::models::{ModelSource, PreprocessingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default watermark asset, relative to the working directory
pub const DEFAULT_WATERMARK_PATH: &str = "logo-t.png";

/// Default endpoint the client posts to
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000/remove-background/";

/// Multipart field carrying the uploaded image
pub const UPLOAD_FIELD: &str = "file";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used to run the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Tract (pure Rust, no external dependencies)
    #[default]
    Tract,
    /// ONNX Runtime (supports GPU acceleration)
    Onnx,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = BgStudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "onnx" | "ort" => Ok(Self::Onnx),
            other => Err(BgStudioError::invalid_config(format!(
                "Unknown backend '{}'. Expected 'tract' or 'onnx'",
                other
            ))),
        }
    }
}

/// What the processor returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Full pipeline: crop, white background, watermark (RGB)
    #[default]
    Composite,
    /// Mask applied as alpha only, no crop or background (RGBA)
    Cutout,
}

/// Parameters of the post-segmentation compositing stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Padding around the content box, as a fraction of the box size per axis
    pub padding_pct: f64,
    /// Opaque background color painted behind the cutout
    pub background_color: [u8; 3],
    /// Watermark is downscaled to at most this fraction of the output width
    pub watermark_max_width_ratio: f64,
    /// Distance in pixels between the watermark and the bottom/right edges
    pub watermark_margin: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            padding_pct: 0.10,
            background_color: [255, 255, 255],
            watermark_max_width_ratio: 0.25,
            watermark_margin: 10,
        }
    }
}

impl CompositorConfig {
    #[must_use]
    pub fn builder() -> CompositorConfigBuilder {
        CompositorConfigBuilder::default()
    }

    /// Validate numeric ranges
    ///
    /// # Errors
    /// - `padding_pct` negative or not finite
    /// - `watermark_max_width_ratio` outside `(0, 1]`
    pub fn validate(&self) -> Result<()> {
        if !self.padding_pct.is_finite() || self.padding_pct < 0.0 {
            return Err(BgStudioError::config_value_error(
                "padding_pct",
                self.padding_pct,
                ">= 0.0",
                Some(0.10),
            ));
        }

        if !self.watermark_max_width_ratio.is_finite()
            || self.watermark_max_width_ratio <= 0.0
            || self.watermark_max_width_ratio > 1.0
        {
            return Err(BgStudioError::config_value_error(
                "watermark_max_width_ratio",
                self.watermark_max_width_ratio,
                "(0.0, 1.0]",
                Some(0.25),
            ));
        }

        Ok(())
    }
}

/// Builder for `CompositorConfig`
#[derive(Debug, Default)]
pub struct CompositorConfigBuilder {
    config: CompositorConfig,
}

impl CompositorConfigBuilder {
    #[must_use]
    pub fn padding_pct(mut self, padding_pct: f64) -> Self {
        self.config.padding_pct = padding_pct;
        self
    }

    #[must_use]
    pub fn background_color(mut self, color: [u8; 3]) -> Self {
        self.config.background_color = color;
        self
    }

    #[must_use]
    pub fn watermark_max_width_ratio(mut self, ratio: f64) -> Self {
        self.config.watermark_max_width_ratio = ratio;
        self
    }

    #[must_use]
    pub fn watermark_margin(mut self, margin: u32) -> Self {
        self.config.watermark_margin = margin;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - See [`CompositorConfig::validate`]
    pub fn build(self) -> Result<CompositorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Segmentation model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Where the ONNX file comes from
    pub source: ModelSource,
    /// Inference engine
    pub backend: BackendType,
    /// ONNX Runtime execution provider (ignored by Tract)
    pub execution_provider: ExecutionProvider,
    /// Input resize and normalization
    pub preprocessing: PreprocessingConfig,
    /// Apply a sigmoid to the raw output (BiRefNet emits logits)
    pub apply_sigmoid: bool,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            source: ModelSource::default(),
            backend: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            preprocessing: PreprocessingConfig::default(),
            apply_sigmoid: true,
            intra_threads: 0,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body in bytes
    pub body_limit_bytes: usize,
    /// Output mode when the request does not ask for one
    pub default_mode: OutputMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_bytes: 25 * 1024 * 1024,
            default_mode: OutputMode::Composite,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            timeout_secs: 300,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub compositor: CompositorConfig,
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
    /// Watermark asset; `None` disables watermarking
    pub watermark_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            compositor: CompositorConfig::default(),
            model: ModelConfig::default(),
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            watermark_path: Some(PathBuf::from(DEFAULT_WATERMARK_PATH)),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or field types
    /// - Validation failures
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BgStudioError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            BgStudioError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BGSTUDIO_*` environment variable overrides
    ///
    /// # Errors
    /// - `BGSTUDIO_PORT` is not a valid port number
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BGSTUDIO_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BGSTUDIO_PORT") {
            self.server.port = port.parse().map_err(|_| {
                BgStudioError::config_value_error("BGSTUDIO_PORT", port.as_str(), "1-65535", None)
            })?;
        }
        if let Some(watermark) = lookup("BGSTUDIO_WATERMARK") {
            self.watermark_path = if watermark.is_empty() {
                None
            } else {
                Some(PathBuf::from(watermark))
            };
        }
        if let Some(url) = lookup("BGSTUDIO_SERVER_URL") {
            self.client.server_url = url;
        }
        Ok(())
    }

    /// Validate all sections
    ///
    /// # Errors
    /// - Compositor range violations
    /// - Zero model input size
    pub fn validate(&self) -> Result<()> {
        self.compositor.validate()?;
        if self.model.preprocessing.target_size == 0 {
            return Err(BgStudioError::invalid_config(
                "model.preprocessing.target_size must be greater than 0",
            ));
        }
        if self.model.preprocessing.normalization_std.iter().any(|s| *s <= 0.0) {
            return Err(BgStudioError::invalid_config(
                "model.preprocessing.normalization_std values must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_compositor_config() {
        let config = CompositorConfig::default();
        assert!((config.padding_pct - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.background_color, [255, 255, 255]);
        assert!((config.watermark_max_width_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.watermark_margin, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compositor_builder_validation() {
        let config = CompositorConfig::builder()
            .padding_pct(0.0)
            .background_color([0, 0, 0])
            .watermark_margin(4)
            .build()
            .unwrap();
        assert_eq!(config.background_color, [0, 0, 0]);
        assert_eq!(config.watermark_margin, 4);

        let err = CompositorConfig::builder().padding_pct(-0.1).build().unwrap_err();
        assert!(err.to_string().contains("padding_pct"));
        assert!(CompositorConfig::builder().padding_pct(f64::NAN).build().is_err());
        assert!(CompositorConfig::builder()
            .watermark_max_width_ratio(0.0)
            .build()
            .is_err());
        assert!(CompositorConfig::builder()
            .watermark_max_width_ratio(1.5)
            .build()
            .is_err());
    }

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!("tract".parse::<BackendType>().unwrap(), BackendType::Tract);
        assert_eq!("ONNX".parse::<BackendType>().unwrap(), BackendType::Onnx);
        assert!("tensorflow".parse::<BackendType>().is_err());
        assert_eq!(BackendType::Onnx.to_string(), "onnx");
    }

    #[test]
    fn test_json_file_with_partial_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bgstudio.json");
        std::fs::write(
            &path,
            r#"{"compositor": {"padding_pct": 0.2}, "server": {"port": 9000}, "watermark_path": null}"#,
        )
        .unwrap();

        let config = AppConfig::from_json_file(&path).unwrap();
        assert!((config.compositor.padding_pct - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.compositor.watermark_margin, 10);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.watermark_path.is_none());
        assert_eq!(config.model.preprocessing.target_size, 1024);
    }

    #[test]
    fn test_json_file_rejects_negative_padding() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, r#"{"compositor": {"padding_pct": -1.0}}"#).unwrap();

        let err = AppConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, BgStudioError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BGSTUDIO_HOST", "127.0.0.1"),
            ("BGSTUDIO_PORT", "8123"),
            ("BGSTUDIO_WATERMARK", ""),
            ("BGSTUDIO_SERVER_URL", "http://example.test/remove-background/"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:8123");
        assert!(config.watermark_path.is_none());
        assert_eq!(
            config.client.server_url,
            "http://example.test/remove-background/"
        );

        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "BGSTUDIO_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("BGSTUDIO_PORT"));
    }
}
