use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{
    models::{
        bucket::{BucketName, InvalidBucketName},
        object::{InvalidObjectKey, ObjectKey},
    },
    services::{archive::ArchiveError, store::StoreError},
};

/// An error on its way out of a handler: the status to answer with and the
/// message placed in the `{"error": ...}` body.
///
/// `bucket` and `key` are request context for the log line only; they never
/// reach the response body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub bucket: Option<String>,
    pub key: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            bucket: None,
            key: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Record the bucket the failed request was addressed to.
    pub fn in_bucket(mut self, bucket: &BucketName) -> Self {
        self.bucket = Some(bucket.to_string());
        self
    }

    /// Record the object key the failed request was working on.
    pub fn for_key(mut self, key: &ObjectKey) -> Self {
        self.key = Some(key.to_string());
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let bucket = self.bucket.as_deref();
        let key = self.key.as_deref();
        if self.status.is_server_error() {
            tracing::error!(
                status = self.status.as_u16(),
                bucket,
                key,
                error = %self.message,
                "request failed"
            );
        } else {
            tracing::warn!(
                status = self.status.as_u16(),
                bucket,
                key,
                error = %self.message,
                "request rejected"
            );
        }

        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

// Caller-input problems are 400s; every store or aggregation failure is a 500,
// whatever its cause.

impl From<InvalidBucketName> for AppError {
    fn from(err: InvalidBucketName) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<InvalidObjectKey> for AppError {
    fn from(err: InvalidObjectKey) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(err: MultipartRejection) -> Self {
        AppError::bad_request(err.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::bad_request(err.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        AppError::internal(err.to_string())
    }
}
