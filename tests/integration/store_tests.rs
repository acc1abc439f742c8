//! Store integration tests through the public `ImageStore` trait.
//!
//! Tests verify:
//! - Chunking and ordered reads
//! - Failed writes leave nothing behind
//! - Duplicate filenames and removal
//! - SHA-256 digests match the payload

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};

use gridfs_image_api::error::StoreError;
use gridfs_image_api::store::{
    generate_filename, is_image_content_type, ByteStream, ImageStore, MemoryImageStore,
    NewImage, StoredFile,
};

use super::test_utils::png_bytes;

fn image(filename: &str) -> NewImage {
    NewImage {
        filename: filename.to_string(),
        content_type: "image/png".to_string(),
    }
}

fn pieces(data: &[u8], size: usize) -> ByteStream<'static> {
    let pieces: Vec<Result<Bytes, StoreError>> = data
        .chunks(size)
        .map(|piece| Ok(Bytes::copy_from_slice(piece)))
        .collect();
    stream::iter(pieces).boxed()
}

async fn read_all(store: &dyn ImageStore, file: &StoredFile) -> Vec<u8> {
    let chunks: Vec<Bytes> = store
        .read_stream(file)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    chunks.concat()
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_store_rechunks_uneven_source() {
    let store = MemoryImageStore::with_chunk_size(100);
    let data = png_bytes(992);

    let stored = store
        .store(image("1-a.png"), pieces(&data, 37))
        .await
        .unwrap();

    assert_eq!(stored.length, 1000);
    assert_eq!(store.chunk_count("1-a.png").await, Some(10));

    let file = store.find_by_filename("1-a.png").await.unwrap().unwrap();
    assert_eq!(file.length, 1000);
    assert_eq!(file.content_type, "image/png");
    assert_eq!(read_all(&store, &file).await, data);
}

#[tokio::test]
async fn test_store_records_sha256() {
    let store = MemoryImageStore::new();
    let data = png_bytes(300);

    let stored = store
        .store(image("1-hash.png"), pieces(&data, 64))
        .await
        .unwrap();

    let expected = hex::encode(Sha256::digest(&data));
    assert_eq!(stored.sha256, expected);

    let file = store.find_by_filename("1-hash.png").await.unwrap().unwrap();
    assert_eq!(file.sha256.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_empty_payload_is_stored() {
    let store = MemoryImageStore::new();

    let stored = store
        .store(image("1-empty.png"), stream::empty().boxed())
        .await
        .unwrap();

    assert_eq!(stored.length, 0);
    let file = store.find_by_filename("1-empty.png").await.unwrap().unwrap();
    assert!(read_all(&store, &file).await.is_empty());
}

#[tokio::test]
async fn test_failed_source_leaves_nothing() {
    let store = MemoryImageStore::with_chunk_size(4);
    let source: ByteStream<'static> = stream::iter(vec![
        Ok(Bytes::from_static(b"\x89PNG\r\n\x1a\n")),
        Ok(Bytes::from_static(b"more bytes")),
        Err(StoreError::Io("client went away".to_string())),
    ])
    .boxed();

    let err = store.store(image("1-broken.png"), source).await.unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));

    assert!(store.is_empty().await);
    assert!(store.find_by_filename("1-broken.png").await.unwrap().is_none());
}

#[tokio::test]
async fn test_non_image_rejected_before_write() {
    let store = MemoryImageStore::new();
    let new_image = NewImage {
        filename: "1-notes.txt".to_string(),
        content_type: "text/plain".to_string(),
    };

    let err = store
        .store(new_image, pieces(b"hello", 5))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidContentType(ref ct) if ct == "text/plain"));
    assert!(store.is_empty().await);
}

// =============================================================================
// Lookup and Removal
// =============================================================================

#[tokio::test]
async fn test_latest_upload_wins_and_remove_takes_all() {
    let store = MemoryImageStore::new();
    store
        .store(image("1-dup.png"), pieces(b"first", 5))
        .await
        .unwrap();
    let second = store
        .store(image("1-dup.png"), pieces(b"second", 6))
        .await
        .unwrap();

    let file = store.find_by_filename("1-dup.png").await.unwrap().unwrap();
    assert_eq!(file.id, second.id);
    assert_eq!(read_all(&store, &file).await, b"second");

    assert!(store.remove("1-dup.png").await.unwrap());
    assert!(store.is_empty().await);
    assert!(!store.remove("1-dup.png").await.unwrap());
}

#[tokio::test]
async fn test_read_after_remove_is_not_found() {
    let store = MemoryImageStore::new();
    store
        .store(image("1-gone.png"), pieces(b"bytes", 5))
        .await
        .unwrap();
    let file = store.find_by_filename("1-gone.png").await.unwrap().unwrap();

    store.remove("1-gone.png").await.unwrap();

    let err = store.read_stream(&file).await.err().unwrap();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_clones_share_storage() {
    let store = MemoryImageStore::new();
    let other = store.clone();

    store
        .store(image("1-shared.png"), pieces(b"data", 4))
        .await
        .unwrap();

    assert!(other.find_by_filename("1-shared.png").await.unwrap().is_some());
    assert!(other.ping().await.is_ok());
    assert_eq!(other.bucket(), store.bucket());
}

// =============================================================================
// Naming and Validation
// =============================================================================

#[test]
fn test_generated_names_are_single_segments() {
    assert_eq!(generate_filename("dog.jpg", 42), "42-dog.jpg");
    assert_eq!(generate_filename("C:\\photos\\dog.jpg", 42), "42-dog.jpg");
    assert_eq!(generate_filename("/", 42), "42-upload");
}

#[test]
fn test_image_type_check() {
    assert!(is_image_content_type("image/svg+xml"));
    assert!(is_image_content_type("Image/Png"));
    assert!(!is_image_content_type("video/mp4"));
}
