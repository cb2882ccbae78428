//! HTTP client for a running bgstudio server

use crate::{
    config::{ClientConfig, UPLOAD_FIELD},
    error::{BgStudioError, Result},
};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the server did with an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Response body written to this path
    Saved(PathBuf),
    /// Server answered with a non-success status
    Rejected { status: u16, body: String },
}

impl RemovalOutcome {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

impl std::fmt::Display for RemovalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Saved(path) => write!(f, "Processed image saved to {}", path.display()),
            Self::Rejected { status, body } => write!(f, "Error: {} - {}", status, body),
        }
    }
}

/// Posts images to the `/remove-background/` endpoint
#[derive(Debug, Clone)]
pub struct RemovalClient {
    client: Client,
    server_url: String,
}

impl RemovalClient {
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| BgStudioError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            server_url: config.server_url.clone(),
        })
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Upload `input` and write the returned PNG to `output`
    ///
    /// A non-success status is not an error: it is returned as
    /// [`RemovalOutcome::Rejected`] with the response text.
    ///
    /// # Errors
    /// - Input unreadable or output unwritable
    /// - Connection failures
    pub async fn remove_background(&self, input: &Path, output: &Path) -> Result<RemovalOutcome> {
        let data = tokio::fs::read(input)
            .await
            .map_err(|e| BgStudioError::file_io_error("read input image", input, &e))?;

        let file_name = input
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(guess_mime(input))
            .map_err(|e| BgStudioError::network_error("Invalid upload content type", e))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        log::debug!("Posting {} to {}", input.display(), self.server_url);
        let response = self
            .client
            .post(&self.server_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                BgStudioError::network_error(format!("Failed to reach {}", self.server_url), e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    log::warn!("Failed to read error response body: {}", e);
                    String::new()
                },
            };
            return Ok(RemovalOutcome::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BgStudioError::network_error("Failed to read response body", e))?;
        tokio::fs::write(output, &body)
            .await
            .map_err(|e| BgStudioError::file_io_error("write output image", output, &e))?;

        Ok(RemovalOutcome::Saved(output.to_path_buf()))
    }
}

/// Upload content type from the file extension
#[must_use]
pub fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("a.tif")), "image/tiff");
        assert_eq!(guess_mime(Path::new("no_extension")), "image/jpeg");
    }

    #[test]
    fn test_outcome_messages() {
        let saved = RemovalOutcome::Saved(PathBuf::from("out.png"));
        assert!(saved.is_saved());
        assert_eq!(saved.to_string(), "Processed image saved to out.png");

        let rejected = RemovalOutcome::Rejected {
            status: 400,
            body: "Missing multipart field 'file'".to_string(),
        };
        assert!(!rejected.is_saved());
        assert_eq!(
            rejected.to_string(),
            "Error: 400 - Missing multipart field 'file'"
        );
    }

    #[tokio::test]
    async fn test_truncated_error_body_still_rejects() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0_u8; 4096];
            // Drain up to the closing multipart boundary
            while !request.ends_with(b"--\r\n") {
                let read = socket.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
            }
            // Promise more body than is sent, then hang up
            socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 100\r\n\r\npartial")
                .await
                .unwrap();
        });

        let temp_dir = tempfile::TempDir::new().unwrap();
        let input = temp_dir.path().join("in.png");
        std::fs::write(&input, b"\x89PNG").unwrap();
        let config = ClientConfig {
            server_url: format!("http://{}/remove-background/", addr),
            ..ClientConfig::default()
        };
        let client = RemovalClient::new(&config).unwrap();

        let outcome = client
            .remove_background(&input, &temp_dir.path().join("out.png"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RemovalOutcome::Rejected {
                status: 502,
                body: String::new(),
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_input_is_io_error() {
        let client = RemovalClient::new(&ClientConfig::default()).unwrap();
        let err = client
            .remove_background(Path::new("/no/such/input.jpg"), Path::new("/tmp/out.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, BgStudioError::Io(_)));
    }
}
