//! HTTP front-end
//!
//! Routes:
//! - `POST /remove-background/` multipart upload (field `file`), optional
//!   `?mode=cutout|composite`, responds with `image/png`
//! - `POST /api/url` JSON `{"url": "..."}`, responds with `image/png`
//! - `GET /health`
//!
//! The pipeline is CPU bound and runs on the blocking thread pool.

use crate::{
    config::{OutputMode, ServerConfig, UPLOAD_FIELD},
    error::{BgStudioError, Result},
    processor::BackgroundRemovalProcessor,
    services::io::{ImageLoader, ImageSource},
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Shared, read-only server state
#[derive(Debug, Clone)]
pub struct AppState {
    processor: Arc<BackgroundRemovalProcessor>,
    loader: ImageLoader,
}

impl AppState {
    /// # Errors
    /// - Failed to create the HTTP client used for URL inputs
    pub fn new(processor: BackgroundRemovalProcessor) -> Result<Self> {
        Ok(Self {
            processor: Arc::new(processor),
            loader: ImageLoader::new(Duration::from_secs(60))?,
        })
    }
}

/// Request failure mapped to an HTTP status with a plain text body
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<BgStudioError> for ApiError {
    fn from(error: BgStudioError) -> Self {
        if error.is_client_error() {
            Self::BadRequest(error.to_string())
        } else {
            Self::Internal(error.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(message) => {
                tracing::error!(error = %message, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            },
        };
        (status, message).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeParams {
    pub mode: Option<OutputMode>,
}

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

/// Build the application router
pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/remove-background/", post(remove_background_handler))
        .route("/api/url", post(url_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
///
/// # Errors
/// - Bind failures
/// - Server I/O errors
pub async fn serve(config: &ServerConfig, processor: BackgroundRemovalProcessor) -> Result<()> {
    let listener = TcpListener::bind(config.bind_address()).await.map_err(|e| {
        BgStudioError::invalid_config(format!("Failed to bind {}: {}", config.bind_address(), e))
    })?;
    serve_on(listener, config, processor).await
}

/// Serve on an already bound listener until Ctrl-C
///
/// # Errors
/// - Server I/O errors
pub async fn serve_on(
    listener: TcpListener,
    config: &ServerConfig,
    processor: BackgroundRemovalProcessor,
) -> Result<()> {
    let model_name = processor.model_name().to_string();
    let app = router(AppState::new(processor)?, config.body_limit_bytes);

    if let Ok(address) = listener.local_addr() {
        tracing::info!(address = %address, model = %model_name, "🌐 Listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn remove_background_handler(
    State(state): State<AppState>,
    Query(params): Query<ModeParams>,
    mut multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
            upload = Some(data.to_vec());
            break;
        }
    }

    let bytes = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing multipart field '{}'", UPLOAD_FIELD))
    })?;
    let mode = params.mode.unwrap_or_else(|| state.processor.mode());
    tracing::debug!(bytes = bytes.len(), mode = ?mode, "Received upload");

    process_to_png(&state, bytes, mode).await
}

async fn url_handler(
    State(state): State<AppState>,
    Query(params): Query<ModeParams>,
    Json(request): Json<UrlRequest>,
) -> std::result::Result<Response, ApiError> {
    let source = ImageSource::parse(&request.url)?;
    if !matches!(source, ImageSource::Url(_)) {
        return Err(ApiError::BadRequest(format!(
            "Expected an http(s) URL, got '{}'",
            request.url
        )));
    }

    let bytes = state.loader.load_bytes(&source).await?;
    let mode = params.mode.unwrap_or_else(|| state.processor.mode());
    process_to_png(&state, bytes, mode).await
}

async fn process_to_png(
    state: &AppState,
    bytes: Vec<u8>,
    mode: OutputMode,
) -> std::result::Result<Response, ApiError> {
    let processor = Arc::clone(&state.processor);
    let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        processor.process_bytes_with_mode(&bytes, mode)?.to_png_bytes()
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Processing task failed: {}", e)))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
