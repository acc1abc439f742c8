//! HTTP server layer for the image API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   POST /upload   GET /image/{filename}   DELETE /delete/{...}   │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │ (bearer)    │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{auth_middleware, bearer_token, AuthError, Authorizer, StaticTokenAuth};
pub use handlers::{
    delete_handler, health_handler, image_handler, root_handler, upload_handler, AppState,
    DeleteResponse, ErrorResponse, HealthResponse, UploadResponse, LIVENESS_TEXT, UPLOAD_FIELD,
};
pub use routes::{create_router, RouterConfig, DEFAULT_CACHE_MAX_AGE, DEFAULT_MAX_UPLOAD_BYTES};
