//! HTTP request handlers for the image API.
//!
//! # Endpoints
//!
//! - `GET /` - Liveness text
//! - `GET /health` - Health check endpoint
//! - `POST /upload` - Store an image from the `photo` multipart field
//! - `GET /image/{filename}` - Stream a stored image
//! - `DELETE /delete/{filename}` - Remove a stored image

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{ApiError, StoreError};
use crate::store::{generate_filename, ByteStream, ImageStore, NewImage, StoredFileRef};

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "photo";

/// Text returned by the liveness endpoint.
pub const LIVENESS_TEXT: &str = "GridFS Image API running";

const IMAGE_NOT_FOUND: &str = "Not found";
const DELETE_NOT_FOUND: &str = "File not found";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image store.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ImageStore> {
    /// The store images are written to and served from
    pub store: Arc<S>,

    /// Cache-Control max-age in seconds for image responses
    pub cache_max_age: u32,

    /// Base URL used for links returned by uploads, overriding the request's
    /// scheme and host
    pub public_base_url: Option<String>,

    /// Honor `X-Forwarded-Proto` when building upload links
    pub trust_proxy: bool,
}

impl<S: ImageStore> AppState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            cache_max_age: 31_536_000,
            public_base_url: None,
            trust_proxy: false,
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_public_base_url(mut self, base_url: Option<String>) -> Self {
        self.public_base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}

impl<S: ImageStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache_max_age: self.cache_max_age,
            public_base_url: self.public_base_url.clone(),
            trust_proxy: self.trust_proxy,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response from a successful upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Absolute link to the stored image
    pub url: String,

    /// Generated storage filename
    pub filename: String,
}

/// Response from a successful delete.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert ApiError to HTTP response.
///
/// - 4xx errors are logged at WARN level (client errors)
/// - 5xx errors are logged at ERROR level (server errors)
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NoFile
            | ApiError::InvalidContentType
            | ApiError::BadUpload(_)
            | ApiError::UnexpectedField => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", message);
        } else if status == StatusCode::NOT_FOUND {
            debug!(status = status.as_u16(), "Request failed: {}", message);
        } else {
            warn!(status = status.as_u16(), "Request failed: {}", message);
        }

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Liveness endpoint.
///
/// `GET /`
pub async fn root_handler() -> &'static str {
    LIVENESS_TEXT
}

/// Health check endpoint.
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Store an uploaded image.
///
/// # Endpoint
///
/// `POST /upload` with a `multipart/form-data` body whose `photo` field is
/// the file.
///
/// # Response
///
/// `200 OK` with `{"url": ..., "filename": ...}`.
///
/// # Errors
///
/// - `400 Bad Request`: no `photo` file, a second `photo` file, non-image
///   content type, or a broken multipart body
/// - `413 Payload Too Large`: body exceeds the upload limit
/// - `500 Internal Server Error`: storage failure
///
/// A file already stored is removed again when the rest of the form fails.
pub async fn upload_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    uri: Uri,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    // A body that is not multipart at all simply carries no file.
    let mut multipart = multipart.map_err(|rejection| {
        debug!("Upload without multipart body: {}", rejection.body_text());
        ApiError::NoFile
    })?;

    let mut stored: Option<StoredFileRef> = None;
    let outcome = loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break Ok(()),
            Err(e) => break Err(multipart_error(e)),
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if stored.is_some() {
            break Err(ApiError::UnexpectedField);
        }
        let content_type = field.content_type().unwrap_or_default().to_string();

        let filename = generate_filename(&original_name, Utc::now().timestamp_millis());
        debug!(%filename, %content_type, "Receiving upload");

        let data: ByteStream<'_> = field.map_err(source_error).boxed();
        let image = NewImage {
            filename,
            content_type,
        };
        match state.store.store(image, data).await {
            Ok(file) => stored = Some(file),
            Err(e) => break Err(ApiError::from_store(e, IMAGE_NOT_FOUND)),
        }
    };

    match (outcome, stored) {
        (Ok(()), Some(stored)) => {
            info!(
                filename = %stored.filename,
                bytes = stored.length,
                bucket = state.store.bucket(),
                "Stored image"
            );

            let url = image_url(&state, &headers, &uri, &stored.filename);
            Ok(Json(UploadResponse {
                url,
                filename: stored.filename,
            }))
        }
        (Ok(()), None) => Err(ApiError::NoFile),
        (Err(err), Some(stored)) => {
            discard(&state, &stored).await;
            Err(err)
        }
        (Err(err), None) => Err(err),
    }
}

/// Remove a file stored earlier in a request that then failed.
async fn discard<S: ImageStore>(state: &AppState<S>, stored: &StoredFileRef) {
    match state.store.remove(&stored.filename).await {
        Ok(_) => debug!(filename = %stored.filename, "Discarded upload"),
        Err(e) => error!("Failed to discard upload {}: {}", stored.filename, e),
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadUpload(err.body_text())
    }
}

fn source_error(err: MultipartError) -> StoreError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StoreError::LimitExceeded(err.body_text())
    } else {
        StoreError::Source(err.body_text())
    }
}

/// Stream a stored image.
///
/// # Endpoint
///
/// `GET /image/{filename}`
///
/// # Response
///
/// `200 OK` with the stored bytes and the stored `Content-Type`. The body is
/// streamed chunk by chunk.
///
/// # Errors
///
/// - `404 Not Found`: no file with this name
/// - `500 Internal Server Error`: storage failure
pub async fn image_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .store
        .find_by_filename(&filename)
        .await
        .map_err(|e| ApiError::from_store(e, IMAGE_NOT_FOUND))?
        .ok_or(ApiError::NotFound(IMAGE_NOT_FOUND))?;

    let chunks = state
        .store
        .read_stream(&file)
        .await
        .map_err(|e| ApiError::from_store(e, IMAGE_NOT_FOUND))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &file.content_type)
        .header(header::CONTENT_LENGTH, file.length)
        .header(
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        )
        .header(
            header::LAST_MODIFIED,
            file.uploaded_at
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        );

    if let Some(ref digest) = file.sha256 {
        builder = builder.header(header::ETAG, format!("\"{}\"", digest));
    }

    builder
        .body(Body::from_stream(chunks))
        .map_err(|e| ApiError::Storage(e.to_string()))
}

/// Delete a stored image.
///
/// # Endpoint
///
/// `DELETE /delete/{filename}`
///
/// # Response
///
/// `200 OK` with `{"success": true}`.
///
/// # Errors
///
/// - `404 Not Found`: no file with this name
/// - `500 Internal Server Error`: storage failure
pub async fn delete_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let removed = state
        .store
        .remove(&filename)
        .await
        .map_err(|e| ApiError::from_store(e, DELETE_NOT_FOUND))?;

    if !removed {
        return Err(ApiError::NotFound(DELETE_NOT_FOUND));
    }

    info!(%filename, bucket = state.store.bucket(), "Deleted image");
    Ok(Json(DeleteResponse { success: true }))
}

/// Absolute link to a stored image.
///
/// Uses the configured public base URL when set. Otherwise the host comes
/// from the `Host` header, then the request URI's authority (HTTP/2), and
/// the scheme from `X-Forwarded-Proto` when the proxy is trusted, then the
/// request URI, defaulting to `http`.
fn image_url<S: ImageStore>(
    state: &AppState<S>,
    headers: &HeaderMap,
    uri: &Uri,
    filename: &str,
) -> String {
    let base = match state.public_base_url {
        Some(ref base) => base.clone(),
        None => {
            let forwarded = if state.trust_proxy {
                headers
                    .get("x-forwarded-proto")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
            } else {
                None
            };
            let scheme = forwarded.or(uri.scheme_str()).unwrap_or("http");
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .or_else(|| uri.authority().map(|a| a.as_str()))
                .unwrap_or("localhost");
            format!("{}://{}", scheme, host)
        }
    };

    format!("{}/image/{}", base, urlencoding::encode(filename))
}

// =============================================================================
// Tests
// =============================================================================
