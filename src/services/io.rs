//! Image I/O operations service
//!
//! Reading images from disk, memory or remote URLs, and writing PNG output.
//! Kept apart from the processor so the pipeline itself never touches the
//! filesystem or network.

use crate::error::{BgStudioError, Result};
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where an input image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Local file
    Path(PathBuf),
    /// Remote `http(s)` URL
    Url(String),
    /// Encoded image bytes already in memory
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// Interpret a user-supplied string as a URL or a file path
    ///
    /// # Errors
    /// - `data:` URLs, which are not supported
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Ok(Self::Url(trimmed.to_string()))
        } else if trimmed.starts_with("data:") {
            Err(BgStudioError::invalid_config(
                "data: URLs are not supported, pass a file path or http(s) URL",
            ))
        } else {
            Ok(Self::Path(PathBuf::from(trimmed)))
        }
    }

    /// Short description for logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// Loads images from any [`ImageSource`]
#[derive(Debug, Clone)]
pub struct ImageLoader {
    client: Client,
}

impl ImageLoader {
    /// Create a loader; `timeout` bounds remote fetches
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BgStudioError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client })
    }

    /// Fetch the encoded bytes of a source
    ///
    /// # Errors
    /// - File read failures
    /// - Network failures or non-success HTTP status
    pub async fn load_bytes(&self, source: &ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Path(path) => tokio::fs::read(path)
                .await
                .map_err(|e| BgStudioError::file_io_error("read image file", path, &e)),
            ImageSource::Url(url) => self.fetch(url).await,
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    /// Fetch and decode a source
    ///
    /// # Errors
    /// - See [`ImageLoader::load_bytes`]
    /// - Undecodable image data
    pub async fn load(&self, source: &ImageSource) -> Result<DynamicImage> {
        let bytes = self.load_bytes(source).await?;
        let image = decode_image(&bytes)?;
        log::debug!(
            "Loaded {}x{} image from {}",
            image.width(),
            image.height(),
            source.describe()
        );
        Ok(image)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Fetching image: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgStudioError::network_error(format!("Failed to fetch {}", url), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgStudioError::Network(format!(
                "HTTP error {} for {}",
                status, url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BgStudioError::network_error(format!("Failed to read body of {}", url), e))?;
        Ok(bytes.to_vec())
    }
}

/// Decode an image with content-based format detection
///
/// # Errors
/// - Unknown or corrupt image data
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Load an image file, falling back to content sniffing when the extension lies
///
/// # Errors
/// - File missing or unreadable
/// - Undecodable image data
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    match image::open(path_ref) {
        Ok(img) => Ok(img),
        Err(e) => {
            log::debug!(
                "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                path_ref.display(),
                e
            );
            let data = std::fs::read(path_ref)
                .map_err(|io_err| BgStudioError::file_io_error("read image data", path_ref, &io_err))?;
            decode_image(&data)
        },
    }
}

/// Encode an image as PNG
///
/// Encoding failures are reported as [`BgStudioError::Processing`]: the
/// image is our own output, so a failure here is never the caller's input.
///
/// # Errors
/// - PNG encoding failures
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| BgStudioError::processing(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Write an image as PNG, creating parent directories
///
/// # Errors
/// - Directory creation, encoding or write failures
pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
    let path_ref = path.as_ref();
    if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| BgStudioError::file_io_error("create output directory", parent, &e))?;
    }
    let bytes = encode_png(image)?;
    std::fs::write(path_ref, bytes)
        .map_err(|e| BgStudioError::file_io_error("write output image", path_ref, &e))
}

/// `<dir>/<stem>.png` for an input path
#[must_use]
pub fn png_output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy().into_owned());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}.png", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_parse_sources() {
        assert_eq!(
            ImageSource::parse("https://example.com/cat.jpg").unwrap(),
            ImageSource::Url("https://example.com/cat.jpg".to_string())
        );
        assert_eq!(
            ImageSource::parse("photos/cat.jpg").unwrap(),
            ImageSource::Path(PathBuf::from("photos/cat.jpg"))
        );
        assert!(ImageSource::parse("data:image/png;base64,AAAA").is_err());
    }

    #[test]
    fn test_png_output_path() {
        assert_eq!(
            png_output_path(Path::new("/tmp/in/cat.photo.jpg"), None),
            PathBuf::from("/tmp/in/cat.photo.png")
        );
        assert_eq!(
            png_output_path(Path::new("/tmp/in/cat.jpg"), Some(Path::new("/out"))),
            PathBuf::from("/out/cat.png")
        );
        assert_eq!(png_output_path(Path::new("cat.jpg"), None), PathBuf::from("cat.png"));
    }

    #[test]
    fn test_encode_decode_png() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 5, Rgb([1, 2, 3])));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), image.to_rgb8());
    }

    #[test]
    fn test_decode_garbage_is_image_error() {
        let err = decode_image(b"not an image").unwrap_err();
        assert!(matches!(err, BgStudioError::Image(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unencodable_image_is_processing_error() {
        // PNG rejects zero-sized images
        let image = DynamicImage::new_rgba8(0, 0);
        let err = encode_png(&image).unwrap_err();
        assert!(matches!(err, BgStudioError::Processing(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_load_image_with_wrong_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("actually_png.jpg");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])));
        std::fs::write(&path, encode_png(&image).unwrap()).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.dimensions(), (4, 4));
    }

    #[tokio::test]
    async fn test_loader_reads_files_and_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("in.png");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([5, 6, 7])));
        save_png(&image, &path).unwrap();

        let loader = ImageLoader::new(Duration::from_secs(5)).unwrap();
        let from_file = loader.load(&ImageSource::Path(path.clone())).await.unwrap();
        assert_eq!(from_file.dimensions(), (3, 2));

        let bytes = std::fs::read(&path).unwrap();
        let from_bytes = loader.load(&ImageSource::Bytes(bytes)).await.unwrap();
        assert_eq!(from_bytes.to_rgb8(), image.to_rgb8());

        let missing = loader
            .load(&ImageSource::Path(temp_dir.path().join("missing.png")))
            .await;
        assert!(matches!(missing, Err(BgStudioError::Io(_))));
    }
}
