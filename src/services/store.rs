//! The object-store boundary.
//!
//! `ObjectStore` is the only seam between the gateway and the backend that
//! actually persists buckets and objects. Implementations must be safe to share
//! across all in-flight requests; the gateway holds a single
//! `Arc<dyn ObjectStore>` built at startup.

use crate::models::{bucket::BucketName, object::ObjectInfo};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, time::Duration};
use thiserror::Error;

/// Longest validity a presigned URL may carry (7 days, S3 limit).
pub const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("presign ttl {0:?} is out of range")]
    InvalidPresignTtl(Duration),
    #[error("{operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lazily produced bucket listing, consumed once.
pub type ObjectListing = BoxStream<'static, StoreResult<ObjectInfo>>;

/// Content of a single object, read chunk by chunk.
pub type ObjectBody = BoxStream<'static, StoreResult<Bytes>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns `false` when the bucket does not exist.
    async fn bucket_exists(&self, bucket: &BucketName) -> StoreResult<bool>;

    /// Create the bucket unless it already exists.
    ///
    /// Losing a creation race against another request is not an error.
    async fn ensure_bucket(&self, bucket: &BucketName) -> StoreResult<()>;

    /// Store `body` under `key`, replacing any previous object with that key.
    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()>;

    /// List every object in the bucket in the order the backend returns them.
    ///
    /// Pagination happens while the stream is polled. A missing bucket
    /// surfaces as `StoreError::BucketNotFound` from the first poll.
    fn list_objects(&self, bucket: &BucketName) -> ObjectListing;

    /// Open the content of one object.
    async fn get_object(&self, bucket: &BucketName, key: &str) -> StoreResult<ObjectBody>;

    /// Generate a presigned GET URL for `key` that stays valid for `ttl`.
    async fn presigned_get_url(
        &self,
        bucket: &BucketName,
        key: &str,
        ttl: Duration,
    ) -> StoreResult<String>;
}

/// Reject TTLs the S3 presigner would refuse.
pub fn check_presign_ttl(ttl: Duration) -> StoreResult<()> {
    if ttl.is_zero() || ttl > MAX_PRESIGN_TTL {
        return Err(StoreError::InvalidPresignTtl(ttl));
    }
    Ok(())
}
