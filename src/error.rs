use thiserror::Error;

/// Errors raised by an [`ImageStore`](crate::store::ImageStore) backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Content type is missing or not an `image/*` type
    #[error("Unsupported content type: {0}")]
    InvalidContentType(String),

    /// No stored file matches the filename
    #[error("File not found: {0}")]
    NotFound(String),

    /// The incoming byte stream failed before the upload completed
    #[error("Upload stream error: {0}")]
    Source(String),

    /// The incoming byte stream exceeded the request body limit
    #[error("Upload too large: {0}")]
    LimitExceeded(String),

    /// Error reported by the database driver
    #[error("Database error: {0}")]
    Database(String),

    /// Read or write failure while moving chunk data
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors returned to HTTP clients.
///
/// The display string is sent verbatim as the `error` field of the JSON body.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The multipart form carried no `photo` file (400)
    #[error("No file uploaded")]
    NoFile,

    /// The uploaded file is not an image (400)
    #[error("Only image files are allowed")]
    InvalidContentType,

    /// The multipart body could not be read (400)
    #[error("{0}")]
    BadUpload(String),

    /// A second `photo` file followed the first one (400)
    #[error("Unexpected field")]
    UnexpectedField,

    /// The request body exceeded the upload limit (413)
    #[error("File too large")]
    PayloadTooLarge,

    /// Lookup by filename found nothing (404)
    #[error("{0}")]
    NotFound(&'static str),

    /// Unexpected storage failure (500)
    #[error("{0}")]
    Storage(String),
}

impl ApiError {
    /// Map a storage error, using `not_found` as the message for a missing file.
    pub fn from_store(err: StoreError, not_found: &'static str) -> Self {
        match err {
            StoreError::InvalidContentType(_) => ApiError::InvalidContentType,
            StoreError::Source(message) => ApiError::BadUpload(message),
            StoreError::LimitExceeded(_) => ApiError::PayloadTooLarge,
            StoreError::NotFound(_) => ApiError::NotFound(not_found),
            other => ApiError::Storage(other.to_string()),
        }
    }
}
