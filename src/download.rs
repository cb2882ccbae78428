//! Model downloading from `HuggingFace` repositories
//!
//! Downloads go to a temporary directory first and are moved into the cache
//! only once complete, so an interrupted download never looks cached.

use crate::cache::ModelCache;
use crate::error::{BgStudioError, Result};
use crate::models::MODEL_FILE;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    fn create(show_progress: bool) -> Self {
        #[cfg(feature = "cli")]
        {
            if show_progress {
                let pb = ProgressBar::new(0);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                return Self::Indicatif(pb);
            }
        }
        let _ = show_progress;
        Self::NoOp
    }

    fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader writing into the given cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| BgStudioError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a model repository's ONNX file into the cache
    ///
    /// Returns the model ID. Already cached models are not downloaded again
    /// unless `force` is set.
    ///
    /// # Errors
    /// - Unsupported URL
    /// - Network errors or non-success HTTP status
    /// - SHA-256 mismatch when `expected_sha256` is given
    /// - File system errors
    pub async fn download_model(
        &self,
        url: &str,
        expected_sha256: Option<&str>,
        force: bool,
        show_progress: bool,
    ) -> Result<String> {
        validate_model_url(url)?;
        let model_id = ModelCache::url_to_model_id(url);
        log::info!("Downloading model from: {}", url);

        if self.cache.is_model_cached(&model_id) && !force {
            log::info!("Model already cached: {}", model_id);
            return Ok(model_id);
        }

        let temp_dir = self.create_temp_download_dir(&model_id)?;
        let final_dir = self.cache.model_dir(&model_id);
        let progress = ProgressIndicator::create(show_progress);

        let file_url = format!("{}/resolve/main/{}", url.trim_end_matches('/'), MODEL_FILE);
        let local_path = temp_dir.join(MODEL_FILE);

        let outcome = async {
            self.download_file(&file_url, &local_path, &progress).await?;
            if !verify_file_integrity(&local_path, expected_sha256)? {
                return Err(BgStudioError::model(format!(
                    "Checksum mismatch for downloaded model {}",
                    model_id
                )));
            }
            if final_dir.exists() {
                fs::remove_dir_all(&final_dir).map_err(|e| {
                    BgStudioError::file_io_error("remove existing model directory", &final_dir, &e)
                })?;
            }
            fs::rename(&temp_dir, &final_dir).map_err(|e| {
                BgStudioError::file_io_error("move downloaded model to cache", &final_dir, &e)
            })
        }
        .await;

        match outcome {
            Ok(()) => {
                progress.finish_with_message(format!("Downloaded {}", model_id));
                log::info!("Successfully downloaded model: {}", model_id);
                Ok(model_id)
            },
            Err(e) => {
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        log::warn!("Failed to cleanup temp directory: {}", cleanup_err);
                    }
                }
                progress.finish_with_message("Download failed".to_string());
                Err(e)
            },
        }
    }

    // Staged inside the cache directory so the final rename never crosses filesystems
    fn create_temp_download_dir(&self, model_id: &str) -> Result<PathBuf> {
        let temp_dir = self.cache.cache_dir().join(format!(".{}.partial", model_id));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                BgStudioError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }
        fs::create_dir_all(&temp_dir)
            .map_err(|e| BgStudioError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgStudioError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgStudioError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(BgStudioError::Network(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            )));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgStudioError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| BgStudioError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| BgStudioError::file_io_error("write to file", local_path, &e))?;
            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| BgStudioError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Verify a file against an expected SHA-256 hex digest; `None` always passes
///
/// # Errors
/// - Failed to read the file
pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
    let Some(expected) = expected_hash else {
        return Ok(true);
    };

    let contents = fs::read(file_path)
        .map_err(|e| BgStudioError::file_io_error("read file for verification", file_path, &e))?;
    let actual_hash = format!("{:x}", Sha256::digest(&contents));

    if actual_hash.eq_ignore_ascii_case(expected) {
        Ok(true)
    } else {
        log::warn!(
            "File integrity check failed for {}: expected {}, got {}",
            file_path.display(),
            expected,
            actual_hash
        );
        Ok(false)
    }
}

/// Validate that a URL points at a `HuggingFace` model repository
///
/// # Errors
/// - URL is not an `https://huggingface.co/<owner>/<repo>` address
pub fn validate_model_url(url: &str) -> Result<()> {
    let Some(repo) = url.strip_prefix("https://huggingface.co/") else {
        return Err(BgStudioError::invalid_config(format!(
            "Unsupported URL format: {}. Only HuggingFace repositories are supported.",
            url
        )));
    };

    let parts: Vec<&str> = repo.trim_end_matches('/').split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(BgStudioError::invalid_config(format!(
            "Invalid HuggingFace repository URL: {}. Expected https://huggingface.co/<owner>/<repo>",
            url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_model_url() {
        assert!(validate_model_url("https://huggingface.co/onnx-community/BiRefNet-ONNX").is_ok());
        assert!(validate_model_url("https://huggingface.co/onnx-community/BiRefNet-ONNX/").is_ok());
        assert!(validate_model_url("https://example.com/model.onnx").is_err());
        assert!(validate_model_url("https://huggingface.co/only-owner").is_err());
        assert!(validate_model_url("https://huggingface.co/a/b/c").is_err());
    }

    #[test]
    fn test_verify_file_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob.bin");
        fs::write(&path, b"hello").unwrap();

        let hello_sha = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert!(verify_file_integrity(&path, None).unwrap());
        assert!(verify_file_integrity(&path, Some(hello_sha)).unwrap());
        assert!(!verify_file_integrity(&path, Some("deadbeef")).unwrap());
    }

    #[tokio::test]
    async fn test_cached_model_skips_download() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let url = "https://huggingface.co/test-owner/test-model";
        let model_file = cache.model_file(&ModelCache::url_to_model_id(url));
        fs::create_dir_all(model_file.parent().unwrap()).unwrap();
        fs::write(&model_file, b"onnx").unwrap();

        let downloader = ModelDownloader::new(cache).unwrap();
        let model_id = downloader
            .download_model(url, None, false, false)
            .await
            .unwrap();
        assert_eq!(model_id, "test-owner--test-model");
    }
}
