//! Bearer-token authentication for write endpoints.
//!
//! Uploads and deletions require an `Authorization` header of the form:
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! The token is checked by an [`Authorizer`]. The stock implementation,
//! [`StaticTokenAuth`], compares it against a single shared admin secret.
//!
//! | Condition | Status | Body |
//! |---|---|---|
//! | header missing or token empty | 401 | `{"error":"No token"}` |
//! | token does not match | 403 | `{"error":"Invalid token"}` |
//!
//! # Example
//!
//! ```rust
//! use gridfs_image_api::server::auth::{Authorizer, StaticTokenAuth, AuthError};
//!
//! let auth = StaticTokenAuth::new("admin-secret");
//! assert!(auth.authorize(Some("admin-secret")).is_ok());
//! assert_eq!(auth.authorize(Some("guess")), Err(AuthError::InvalidToken));
//! assert_eq!(auth.authorize(None), Err(AuthError::MissingToken));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::handlers::ErrorResponse;

// =============================================================================
// Types
// =============================================================================

/// Authentication error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token was supplied
    MissingToken,

    /// A token was supplied but is not accepted
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "No token"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
        };

        // A wrong token may be someone probing, a missing one is usually a
        // misconfigured client.
        match self {
            AuthError::InvalidToken => {
                warn!(status = status.as_u16(), "Authentication failed: {}", self)
            }
            AuthError::MissingToken => {
                debug!(status = status.as_u16(), "Authentication failed: {}", self)
            }
        }

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// =============================================================================
// Authorizers
// =============================================================================

/// Decides whether a bearer token may perform privileged operations.
pub trait Authorizer: Send + Sync {
    /// `token` is `None` when the request carried no usable bearer token.
    fn authorize(&self, token: Option<&str>) -> Result<(), AuthError>;
}

/// Single shared-secret authorizer.
#[derive(Clone)]
pub struct StaticTokenAuth {
    token: Vec<u8>,
}

impl StaticTokenAuth {
    pub fn new(token: impl AsRef<[u8]>) -> Self {
        Self {
            token: token.as_ref().to_vec(),
        }
    }
}

impl Authorizer for StaticTokenAuth {
    fn authorize(&self, token: Option<&str>) -> Result<(), AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;

        // ct_eq on slices of different length returns false without
        // comparing contents.
        if !self.token.is_empty() && bool::from(token.as_bytes().ct_eq(&self.token)) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Extract the token from `Authorization: <scheme> <token>`.
///
/// Everything after the first space is the token. Returns `None` when the
/// header is absent, not valid UTF-8, or carries no token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (_, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Axum middleware rejecting requests that fail the [`Authorizer`].
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use axum::{middleware, routing::post, Router};
/// use gridfs_image_api::server::auth::{auth_middleware, Authorizer, StaticTokenAuth};
///
/// let auth: Arc<dyn Authorizer> = Arc::new(StaticTokenAuth::new("secret"));
/// let app = Router::new()
///     .route("/upload", post(upload))
///     .route_layer(middleware::from_fn_with_state(auth, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(auth): State<Arc<dyn Authorizer>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    auth.authorize(bearer_token(request.headers()))?;
    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
