//! Router configuration for the image API.
//!
//! This module defines the HTTP routes and applies middleware for
//! authentication, body limits, CORS and tracing.
//!
//! # Route Structure
//!
//! ```text
//! /                     - Liveness text (public)
//! /health               - Health check (public)
//! /image/{filename}     - Stream an image (public)
//! /upload               - Upload an image (protected)
//! /delete/{filename}    - Delete an image (protected)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gridfs_image_api::server::routes::{create_router, RouterConfig};
//! use gridfs_image_api::store::GridFsImageStore;
//!
//! let store = GridFsImageStore::connect(&uri, None, "uploads", None).await?;
//! let router = create_router(store, RouterConfig::new("admin-token"));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, Authorizer, StaticTokenAuth};
use super::handlers::{
    delete_handler, health_handler, image_handler, root_handler, upload_handler, AppState,
};
use crate::store::ImageStore;

/// Default maximum request body size for uploads (25 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Default Cache-Control max-age for images (one year; files are immutable).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 31_536_000;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Shared admin token for upload and delete
    pub admin_token: String,

    /// Whether upload and delete require the admin token
    pub auth_enabled: bool,

    /// Custom authorizer replacing the static admin token check
    pub authorizer: Option<Arc<dyn Authorizer>>,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds for image responses
    pub cache_max_age: u32,

    /// Maximum accepted request body size in bytes
    pub max_upload_bytes: usize,

    /// Base URL for links returned by uploads
    pub public_base_url: Option<String>,

    /// Honor `X-Forwarded-Proto` from a reverse proxy
    pub trust_proxy: bool,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration with the given admin token.
    ///
    /// By default:
    /// - Authentication is enabled
    /// - CORS allows any origin
    /// - Uploads are limited to 25 MiB
    /// - Tracing is enabled
    pub fn new(admin_token: impl Into<String>) -> Self {
        Self {
            admin_token: admin_token.into(),
            auth_enabled: true,
            authorizer: None,
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            public_base_url: None,
            trust_proxy: false,
            enable_tracing: true,
        }
    }

    /// Create a configuration with authentication disabled.
    ///
    /// **Warning**: anyone can upload and delete. Development only.
    pub fn without_auth() -> Self {
        Self {
            auth_enabled: false,
            ..Self::new(String::new())
        }
    }

    /// Use a custom authorizer for protected routes.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self.auth_enabled = true;
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_public_base_url(mut self, base_url: Option<String>) -> Self {
        self.public_base_url = base_url;
        self
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    fn build_authorizer(&self) -> Arc<dyn Authorizer> {
        match self.authorizer {
            Some(ref authorizer) => Arc::clone(authorizer),
            None => Arc::new(StaticTokenAuth::new(&self.admin_token)),
        }
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Public routes (liveness, health, image download)
/// - Write routes (upload, delete) behind the authorizer when auth is enabled
/// - Request body limit
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router<S>(store: S, config: RouterConfig) -> Router
where
    S: ImageStore + 'static,
{
    let app_state = AppState::new(store)
        .with_cache_max_age(config.cache_max_age)
        .with_public_base_url(config.public_base_url.clone())
        .with_trust_proxy(config.trust_proxy);

    let write_routes = Router::new()
        .route("/upload", post(upload_handler::<S>))
        .route("/delete/{filename}", delete(delete_handler::<S>));

    // route_layer keeps unknown paths at 404 instead of 401
    let write_routes = if config.auth_enabled {
        write_routes.route_layer(middleware::from_fn_with_state(
            config.build_authorizer(),
            auth_middleware,
        ))
    } else {
        write_routes
    };

    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/image/{filename}", get(image_handler::<S>))
        .merge(write_routes)
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
