//! Image storage layer.
//!
//! Stored images live in a chunked binary store: a metadata record per file
//! plus an ordered run of fixed-size chunks. The HTTP layer only talks to the
//! [`ImageStore`] trait, so the backing database is chosen at startup.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           ImageStore Trait              │
//! │  (store / find / stream / remove)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ GridFsImageStore│    │  MemoryImageStore   │
//! │ (MongoDB GridFS)│    │  (in-process)       │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod gridfs;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::StoreError;

pub use gridfs::{GridFsImageStore, DEFAULT_DATABASE};
pub use memory::{MemoryImageStore, DEFAULT_MEMORY_CHUNK_SIZE};

/// Default bucket (root collection prefix) for stored images.
pub const DEFAULT_BUCKET: &str = "uploads";

/// Content type reported for records that carry none.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Ordered stream of byte chunks flowing into or out of a store.
pub type ByteStream<'a> = BoxStream<'a, Result<Bytes, StoreError>>;

/// Parameters for a new upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    /// Generated storage filename (see [`generate_filename`])
    pub filename: String,

    /// MIME type supplied by the client
    pub content_type: String,
}

/// Reference returned after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFileRef {
    /// Backend identifier of the file record
    pub id: String,
    pub filename: String,
    pub length: u64,
    /// Hex-encoded SHA-256 of the payload
    pub sha256: String,
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Backend identifier of the file record
    pub id: String,
    pub filename: String,
    pub content_type: String,
    /// Payload size in bytes
    pub length: u64,
    pub uploaded_at: DateTime<Utc>,
    /// Hex-encoded SHA-256 of the payload, when recorded
    pub sha256: Option<String>,
}

/// Chunked binary storage for uploaded images.
///
/// Implementations must never expose a partially written file: a failed
/// [`store`](ImageStore::store) leaves nothing reachable through
/// [`find_by_filename`](ImageStore::find_by_filename).
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Write `data` as a new file.
    ///
    /// The content type is validated before any byte is written.
    async fn store(&self, image: NewImage, data: ByteStream<'_>)
        -> Result<StoredFileRef, StoreError>;

    /// Look up a file by exact filename. The most recent upload wins when
    /// several files share a name.
    async fn find_by_filename(&self, filename: &str) -> Result<Option<StoredFile>, StoreError>;

    /// Open a lazy, ordered stream over the file's chunks.
    async fn read_stream(&self, file: &StoredFile) -> Result<ByteStream<'static>, StoreError>;

    /// Delete every file with this filename, metadata and chunks.
    ///
    /// Returns `false` when no file matched.
    async fn remove(&self, filename: &str) -> Result<bool, StoreError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Name of the bucket files are grouped under.
    fn bucket(&self) -> &str;
}

/// Returns true for `image/*` MIME types (case-insensitive).
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .get(..6)
        .map(|prefix| prefix.eq_ignore_ascii_case("image/"))
        .unwrap_or(false)
}

/// Reject anything that is not an `image/*` type.
pub fn validate_content_type(content_type: &str) -> Result<(), StoreError> {
    if is_image_content_type(content_type) {
        Ok(())
    } else {
        Err(StoreError::InvalidContentType(content_type.to_string()))
    }
}

/// Build the storage filename `<millis>-<client name>`.
///
/// Only the last path component of the client name is kept so the result is
/// always a single URL path segment.
pub fn generate_filename(original: &str, timestamp_millis: i64) -> String {
    format!("{}-{}", timestamp_millis, client_basename(original))
}

fn client_basename(original: &str) -> &str {
    let name = original
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(original)
        .trim();
    if name.is_empty() {
        "upload"
    } else {
        name
    }
}
