//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for bgstudio operations
pub type Result<T> = std::result::Result<T, BgStudioError>;

/// Error types for the segmentation and compositing pipeline and its front-ends
#[derive(Error, Debug)]
pub enum BgStudioError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Mask and image do not share the same pixel grid
    #[error("Dimension mismatch: image is {}x{} but mask is {}x{}", image.0, image.1, mask.0, mask.1)]
    DimensionMismatch {
        /// Image dimensions (width, height)
        image: (u32, u32),
        /// Mask dimensions (width, height)
        mask: (u32, u32),
    },

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or download errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network errors (image fetch, model download, client requests)
    #[error("Network error: {0}")]
    Network(String),

    /// Generic processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Watermark asset could not be loaded or resized
    #[error("Watermark error: {0}")]
    Watermark(String),
}

impl BgStudioError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn watermark<S: Into<String>>(msg: S) -> Self {
        Self::Watermark(msg.into())
    }

    /// Create a dimension mismatch error from image and mask sizes
    #[must_use]
    pub fn dimension_mismatch(image: (u32, u32), mask: (u32, u32)) -> Self {
        Self::DimensionMismatch { image, mask }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create a network error with a context message
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error was caused by bad client input rather than a server fault
    ///
    /// Undecodable uploads are the client's fault; failing to encode or
    /// write our own output is not.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Image(error) => !matches!(
                error,
                image::ImageError::Encoding(_) | image::ImageError::IoError(_)
            ),
            Self::InvalidConfig(_) | Self::Network(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BgStudioError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = BgStudioError::invalid_config("padding must be finite");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: padding must be finite"
        );
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = BgStudioError::dimension_mismatch((500, 300), (1024, 1024));
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: image is 500x300 but mask is 1024x1024"
        );
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = BgStudioError::file_io_error("read watermark", Path::new("logo-t.png"), &io_error);
        let message = err.to_string();
        assert!(message.contains("read watermark"));
        assert!(message.contains("logo-t.png"));

        let err = BgStudioError::config_value_error("padding_pct", -0.5, ">= 0.0", Some(0.1));
        let message = err.to_string();
        assert!(message.contains("padding_pct"));
        assert!(message.contains("-0.5"));
        assert!(message.contains("Recommended: 0.1"));

        let err = BgStudioError::network_error("Failed to fetch image", "connection refused");
        assert!(err.is_client_error());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_image_encoding_errors_are_server_faults() {
        let decode = image::load_from_memory(b"junk").unwrap_err();
        assert!(BgStudioError::from(decode).is_client_error());

        let encode = image::ImageError::Encoding(image::error::EncodingError::new(
            image::error::ImageFormatHint::Exact(image::ImageFormat::Png),
            "encoder failed",
        ));
        assert!(!BgStudioError::from(encode).is_client_error());
        assert!(!BgStudioError::processing("PNG encoding failed").is_client_error());
    }
}
