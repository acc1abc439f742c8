//! # GridFS Image API
//!
//! A minimal HTTP API for uploading, serving and deleting images stored in
//! MongoDB GridFS.
//!
//! ## Features
//!
//! - **Chunked storage**: images are written to a GridFS bucket chunk by chunk
//!   and streamed back without buffering whole files
//! - **Image-only uploads**: anything that is not an `image/*` type is
//!   rejected before storage
//! - **Bearer-token writes**: upload and delete require a shared admin token
//!
//! ## Architecture
//!
//! - [`store`] - `ImageStore` trait with GridFS and in-memory backends
//! - [`server`] - Axum-based HTTP server, auth middleware and routes
//! - [`config`] - CLI and configuration types
//! - [`error`] - Storage and HTTP error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use gridfs_image_api::{create_router, GridFsImageStore, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store =
//!         GridFsImageStore::connect("mongodb://localhost:27017", None, "uploads", None).await?;
//!     let router = create_router(store, RouterConfig::new("admin-token"));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, MongoConfig, ServeConfig};
pub use error::{ApiError, StoreError};
pub use server::{
    auth_middleware, create_router, AppState, AuthError, Authorizer, DeleteResponse,
    ErrorResponse, RouterConfig, StaticTokenAuth, UploadResponse,
};
pub use store::{
    generate_filename, is_image_content_type, ByteStream, GridFsImageStore, ImageStore,
    MemoryImageStore, NewImage, StoredFile, StoredFileRef, DEFAULT_BUCKET,
};
