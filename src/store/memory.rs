//! In-process implementation of `ImageStore`.
//!
//! Mirrors the GridFS layout (one record per file, payload split into
//! fixed-size chunks) without a database. Used by the test suite and for
//! running the API locally.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::{
    validate_content_type, ByteStream, ImageStore, NewImage, StoredFile, StoredFileRef,
    DEFAULT_BUCKET,
};

/// Default chunk size, matching the GridFS driver default (255 KiB).
pub const DEFAULT_MEMORY_CHUNK_SIZE: usize = 255 * 1024;

struct Entry {
    file: StoredFile,
    chunks: Vec<Bytes>,
}

/// Chunked image store held in memory.
///
/// Clones share the same underlying storage.
#[derive(Clone)]
pub struct MemoryImageStore {
    bucket: String,
    chunk_size: usize,
    entries: Arc<RwLock<Vec<Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryImageStore {
    /// Create an empty store using the default bucket and chunk size.
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_MEMORY_CHUNK_SIZE)
    }

    /// Create an empty store splitting payloads into `chunk_size` pieces.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            chunk_size: chunk_size.max(1),
            entries: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of chunks held for the most recent file with this name.
    pub async fn chunk_count(&self, filename: &str) -> Option<usize> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .find(|entry| entry.file.filename == filename)
            .map(|entry| entry.chunks.len())
    }

    fn allocate_id(&self) -> String {
        format!("{:024x}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn store(
        &self,
        image: NewImage,
        mut data: ByteStream<'_>,
    ) -> Result<StoredFileRef, StoreError> {
        validate_content_type(&image.content_type)?;

        // Chunks are staged locally and only published once the source
        // stream has been fully consumed.
        let mut chunks = Vec::new();
        let mut pending = BytesMut::new();
        let mut hasher = Sha256::new();
        let mut length = 0u64;

        while let Some(piece) = data.next().await {
            let piece = piece?;
            hasher.update(&piece);
            length += piece.len() as u64;
            pending.extend_from_slice(&piece);

            while pending.len() >= self.chunk_size {
                chunks.push(pending.split_to(self.chunk_size).freeze());
            }
        }
        if !pending.is_empty() {
            chunks.push(pending.freeze());
        }

        let sha256 = hex::encode(hasher.finalize());
        let file = StoredFile {
            id: self.allocate_id(),
            filename: image.filename,
            content_type: image.content_type,
            length,
            uploaded_at: Utc::now(),
            sha256: Some(sha256.clone()),
        };
        let stored = StoredFileRef {
            id: file.id.clone(),
            filename: file.filename.clone(),
            length,
            sha256,
        };

        self.entries.write().await.push(Entry { file, chunks });
        Ok(stored)
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<StoredFile>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .find(|entry| entry.file.filename == filename)
            .map(|entry| entry.file.clone()))
    }

    async fn read_stream(&self, file: &StoredFile) -> Result<ByteStream<'static>, StoreError> {
        let entries = self.entries.read().await;
        let entry = entries
            .iter()
            .find(|entry| entry.file.id == file.id)
            .ok_or_else(|| StoreError::NotFound(file.filename.clone()))?;

        let chunks = entry.chunks.clone();
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn remove(&self, filename: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.file.filename != filename);
        Ok(entries.len() != before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
