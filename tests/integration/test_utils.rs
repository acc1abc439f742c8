//! Test utilities for integration tests.
//!
//! Provides multipart body builders, request helpers and a store that fails
//! on demand.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use gridfs_image_api::error::StoreError;
use gridfs_image_api::store::{
    ByteStream, ImageStore, MemoryImageStore, NewImage, StoredFile, StoredFileRef,
};
use gridfs_image_api::{create_router, RouterConfig};

pub const TEST_TOKEN: &str = "test-admin-token";
pub const TEST_HOST: &str = "images.test";
pub const BEARER: &str = "Bearer test-admin-token";

const BOUNDARY: &str = "----gridfs-image-api-test-boundary";

/// A small but valid PNG header followed by arbitrary bytes.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend((0..len).map(|i| (i % 251) as u8));
    data
}

/// One part of a multipart form.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(name: &'a str, filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content_type: None,
            data: value.as_bytes(),
        }
    }
}

/// Encode parts as a `multipart/form-data` body.
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{}\"", filename));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Build a `POST /upload` request, with an optional `Authorization` value.
pub fn upload_request(parts: &[Part<'_>], authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::HOST, TEST_HOST)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

/// Build an upload request to an absolute URI without a `Host` header, the
/// way HTTP/2 requests arrive.
pub fn upload_request_to(
    uri: &str,
    parts: &[Part<'_>],
    authorization: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

/// Build a `DELETE /delete/{filename}` request.
pub fn delete_request(filename: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("DELETE")
        .uri(format!("/delete/{}", urlencoding::encode(filename)));
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

/// Build a `GET /image/{filename}` request.
pub fn image_request(filename: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/image/{}", urlencoding::encode(filename)))
        .body(Body::empty())
        .unwrap()
}

/// Router with auth enabled over a shared in-memory store.
pub fn authed_router(store: &MemoryImageStore) -> Router {
    create_router(store.clone(), RouterConfig::new(TEST_TOKEN).with_tracing(false))
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Upload `data` as `photo` and return the generated filename.
pub async fn upload_png(router: &Router, name: &str, data: &[u8]) -> String {
    let request = upload_request(
        &[Part::file("photo", name, "image/png", data)],
        Some(BEARER),
    );
    let response = send(router, request).await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    json["filename"].as_str().unwrap().to_string()
}

// =============================================================================
// Failing Store
// =============================================================================

/// A store whose backend is unreachable.
pub struct FailingStore;

fn unavailable() -> StoreError {
    StoreError::Database("connection refused".to_string())
}

#[async_trait]
impl ImageStore for FailingStore {
    async fn store(
        &self,
        _image: NewImage,
        _data: ByteStream<'_>,
    ) -> Result<StoredFileRef, StoreError> {
        Err(unavailable())
    }

    async fn find_by_filename(&self, _filename: &str) -> Result<Option<StoredFile>, StoreError> {
        Err(unavailable())
    }

    async fn read_stream(&self, _file: &StoredFile) -> Result<ByteStream<'static>, StoreError> {
        Err(unavailable())
    }

    async fn remove(&self, _filename: &str) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }

    fn bucket(&self) -> &str {
        "uploads"
    }
}
