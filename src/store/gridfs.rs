//! MongoDB GridFS implementation of `ImageStore`.
//!
//! Files are written through the driver's GridFS bucket API, which splits the
//! payload into `<bucket>.chunks` documents and records a `<bucket>.files`
//! document once the upload stream is closed. The content type and SHA-256
//! digest are kept in the files document's `metadata`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::AsyncWriteExt;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, GridFsErrorKind};
use mongodb::gridfs::{FilesCollectionDocument, GridFsBucket};
use mongodb::options::{GridFsBucketOptions, GridFsFindOneOptions};
use mongodb::{Client, Collection, Database};
use sha2::{Digest, Sha256};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

use crate::error::StoreError;

use super::{
    validate_content_type, ByteStream, ImageStore, NewImage, StoredFile, StoredFileRef,
    FALLBACK_CONTENT_TYPE,
};

/// Database used when neither the configuration nor the URI names one.
pub const DEFAULT_DATABASE: &str = "images";

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. }) => {
                StoreError::NotFound(err.to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// GridFS-backed image store.
///
/// # Example
///
/// ```ignore
/// use gridfs_image_api::store::GridFsImageStore;
///
/// let store = GridFsImageStore::connect("mongodb://localhost:27017", None, "uploads", None).await?;
/// store.ping().await?;
/// ```
#[derive(Clone)]
pub struct GridFsImageStore {
    database: Database,
    bucket: GridFsBucket,
    bucket_name: String,
}

impl GridFsImageStore {
    /// Create a store over an existing database handle.
    ///
    /// `chunk_size` overrides the driver's default chunk size (255 KiB).
    pub fn new(database: Database, bucket_name: impl Into<String>, chunk_size: Option<u32>) -> Self {
        let bucket_name = bucket_name.into();
        let options = GridFsBucketOptions::builder()
            .bucket_name(bucket_name.clone())
            .chunk_size_bytes(chunk_size)
            .build();
        let bucket = database.gridfs_bucket(options);

        Self {
            database,
            bucket,
            bucket_name,
        }
    }

    /// Build a client from a connection string and open the store.
    ///
    /// The database is `database` when given, else the one named in the URI,
    /// else [`DEFAULT_DATABASE`]. The driver connects lazily; call
    /// [`ImageStore::ping`] to verify connectivity.
    pub async fn connect(
        uri: &str,
        database: Option<&str>,
        bucket_name: impl Into<String>,
        chunk_size: Option<u32>,
    ) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let database = match database {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
        };
        debug!(database = database.name(), "Opened MongoDB database");

        Ok(Self::new(database, bucket_name, chunk_size))
    }

    /// Name of the database holding the bucket.
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    fn chunks(&self) -> Collection<Document> {
        self.database
            .collection(&format!("{}.chunks", self.bucket_name))
    }

    fn files(&self) -> Collection<Document> {
        self.database.collection(&format!("{}.files", self.bucket_name))
    }

    /// Delete chunks left behind for `files_id` after a failed delete.
    async fn sweep_chunks(&self, files_id: &Bson) {
        match self
            .chunks()
            .delete_many(doc! { "files_id": files_id.clone() })
            .await
        {
            Ok(result) => debug!(
                deleted = result.deleted_count,
                "Swept chunks after failed delete"
            ),
            Err(e) => error!("Failed to sweep chunks for {}: {}", files_id, e),
        }
    }
}

fn stored_file(document: FilesCollectionDocument) -> StoredFile {
    let metadata = document.metadata.unwrap_or_default();
    let content_type = metadata
        .get_str("contentType")
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string();
    let sha256 = metadata.get_str("sha256").ok().map(str::to_string);

    let id = match &document.id {
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    };

    StoredFile {
        id,
        filename: document.filename.unwrap_or_default(),
        content_type,
        length: document.length,
        uploaded_at: DateTime::<Utc>::from_timestamp_millis(
            document.upload_date.timestamp_millis(),
        )
        .unwrap_or_default(),
        sha256,
    }
}

fn latest_first() -> GridFsFindOneOptions {
    GridFsFindOneOptions::builder()
        .sort(doc! { "uploadDate": -1 })
        .build()
}

#[async_trait]
impl ImageStore for GridFsImageStore {
    async fn store(
        &self,
        image: NewImage,
        mut data: ByteStream<'_>,
    ) -> Result<StoredFileRef, StoreError> {
        validate_content_type(&image.content_type)?;

        let mut upload = self
            .bucket
            .open_upload_stream(&image.filename)
            .metadata(doc! { "contentType": image.content_type.as_str() })
            .await?;
        let files_id = upload.id().clone();

        let mut hasher = Sha256::new();
        let mut length = 0u64;

        let written: Result<(), StoreError> = async {
            while let Some(piece) = data.next().await {
                let piece = piece?;
                hasher.update(&piece);
                length += piece.len() as u64;
                upload.write_all(&piece).await?;
            }
            upload.close().await?;
            Ok(())
        }
        .await;

        // The files document is only written on close, so aborting removes
        // every chunk written so far and nothing becomes visible.
        if let Err(err) = written {
            warn!(filename = %image.filename, "Upload failed, aborting: {}", err);
            if let Err(abort_err) = upload.abort().await {
                error!("Failed to abort upload {}: {}", files_id, abort_err);
                self.sweep_chunks(&files_id).await;
            }
            return Err(err);
        }

        let sha256 = hex::encode(hasher.finalize());
        if let Err(e) = self
            .files()
            .update_one(
                doc! { "_id": files_id.clone() },
                doc! { "$set": { "metadata.sha256": sha256.as_str() } },
            )
            .await
        {
            warn!("Failed to record digest for {}: {}", image.filename, e);
        }

        let id = match &files_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };

        Ok(StoredFileRef {
            id,
            filename: image.filename,
            length,
            sha256,
        })
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<StoredFile>, StoreError> {
        let document = self
            .bucket
            .find_one(doc! { "filename": filename })
            .with_options(latest_first())
            .await?;

        Ok(document.map(stored_file))
    }

    async fn read_stream(&self, file: &StoredFile) -> Result<ByteStream<'static>, StoreError> {
        let download = match ObjectId::parse_str(&file.id) {
            Ok(oid) => self.bucket.open_download_stream(Bson::ObjectId(oid)).await?,
            Err(_) => {
                self.bucket
                    .open_download_stream_by_name(&file.filename)
                    .await?
            }
        };

        let chunks = ReaderStream::new(download.compat()).map_err(StoreError::from);
        Ok(chunks.boxed())
    }

    async fn remove(&self, filename: &str) -> Result<bool, StoreError> {
        let files: Vec<FilesCollectionDocument> = self
            .bucket
            .find(doc! { "filename": filename })
            .await?
            .try_collect()
            .await?;

        let mut removed = false;
        for file in files {
            match self.bucket.delete(file.id.clone()).await {
                Ok(()) => removed = true,
                // Removed concurrently by another request.
                Err(e) if matches!(
                    e.kind.as_ref(),
                    ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. })
                ) => {}
                Err(e) => {
                    error!(filename, "Failed to delete {}: {}", file.id, e);
                    self.sweep_chunks(&file.id).await;
                    return Err(e.into());
                }
            }
        }

        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }
}
