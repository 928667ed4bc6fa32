//! S3-compatible backend (MinIO, AWS S3, LocalStack) built on `aws-sdk-s3`.
//!
//! The client is configured with a custom endpoint, static credentials and
//! `force_path_style(true)` so bucket names never end up in the host name,
//! which is what MinIO deployments expect.

use crate::{
    config::StoreConfig,
    models::{bucket::BucketName, object::ObjectInfo},
    services::store::{
        ObjectBody, ObjectListing, ObjectStore, StoreError, StoreResult, check_presign_ttl,
    },
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client as S3Client,
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::{error::Error as StdError, time::Duration};
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    /// Build the shared S3 client from the startup configuration.
    pub async fn connect(cfg: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            cfg.access_key.clone(),
            cfg.secret_key.expose().to_string(),
            None,
            None,
            "object-gateway-env",
        );
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(cfg.endpoint_url())
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: S3Client::from_conf(s3_config),
        }
    }
}

/// Collapse an SDK error into the opaque backend error the gateway reports.
fn backend_error<E>(operation: &'static str, err: SdkError<E>) -> StoreError
where
    E: StdError + Send + Sync + 'static,
{
    StoreError::Backend {
        operation,
        message: DisplayErrorContext(&err).to_string(),
    }
}

fn is_status<E>(err: &SdkError<E>, status: u16) -> bool {
    err.raw_response()
        .is_some_and(|resp| resp.status().as_u16() == status)
}

fn has_code<E: ProvideErrorMetadata>(err: &SdkError<E>, code: &str) -> bool {
    err.as_service_error()
        .and_then(ProvideErrorMetadata::code)
        .is_some_and(|c| c == code)
}

fn to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

/// Walk ListObjectsV2 pages with continuation tokens, yielding one descriptor
/// per object. Each page is fetched only when the previous one is drained.
fn paginate(client: S3Client, bucket: String) -> impl Stream<Item = StoreResult<ObjectInfo>> {
    async_stream::try_stream! {
        let mut continuation: Option<String> = None;
        loop {
            let page = client
                .list_objects_v2()
                .bucket(&bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| {
                    if has_code(&err, "NoSuchBucket") || is_status(&err, 404) {
                        StoreError::BucketNotFound(bucket.clone())
                    } else {
                        backend_error("list_objects", err)
                    }
                })?;

            debug!(bucket = %bucket, count = page.contents().len(), "listed page");
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                yield ObjectInfo {
                    key: key.to_string(),
                    size_bytes: object.size().unwrap_or(0).max(0) as u64,
                    content_type: None,
                    etag: object.e_tag().map(|t| t.trim_matches('"').to_string()),
                    last_modified: object.last_modified().and_then(to_chrono),
                };
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn bucket_exists(&self, bucket: &BucketName) -> StoreResult<bool> {
        match self.client.head_bucket().bucket(bucket.as_str()).send().await {
            Ok(_) => Ok(true),
            Err(err)
                if err.as_service_error().is_some_and(|e| e.is_not_found())
                    || is_status(&err, 404) =>
            {
                Ok(false)
            }
            Err(err) => Err(backend_error("head_bucket", err)),
        }
    }

    async fn ensure_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        if self.bucket_exists(bucket).await? {
            return Ok(());
        }

        debug!(bucket = %bucket, "creating bucket");
        match self
            .client
            .create_bucket()
            .bucket(bucket.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(()),
            // Another request created it between the HEAD and the CREATE.
            Err(err)
                if err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                }) =>
            {
                Ok(())
            }
            Err(err) => Err(backend_error("create_bucket", err)),
        }
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()> {
        let size = body.len() as i64;
        self.client
            .put_object()
            .bucket(bucket.as_str())
            .key(key)
            .content_type(content_type)
            .content_length(size)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                if has_code(&err, "NoSuchBucket") {
                    StoreError::BucketNotFound(bucket.to_string())
                } else {
                    backend_error("put_object", err)
                }
            })?;
        debug!(bucket = %bucket, key, size, "stored object");
        Ok(())
    }

    fn list_objects(&self, bucket: &BucketName) -> ObjectListing {
        Box::pin(paginate(self.client.clone(), bucket.to_string()))
    }

    async fn get_object(&self, bucket: &BucketName, key: &str) -> StoreResult<ObjectBody> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket.as_str())
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    StoreError::ObjectNotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else if has_code(&err, "NoSuchBucket") {
                    StoreError::BucketNotFound(bucket.to_string())
                } else {
                    backend_error("get_object", err)
                }
            })?;

        let reader = resp.body.into_async_read();
        let stream = ReaderStream::new(reader).map(|chunk| chunk.map_err(StoreError::Io));
        Ok(Box::pin(stream))
    }

    async fn presigned_get_url(
        &self,
        bucket: &BucketName,
        key: &str,
        ttl: Duration,
    ) -> StoreResult<String> {
        check_presign_ttl(ttl)?;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|_| StoreError::InvalidPresignTtl(ttl))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket.as_str())
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| backend_error("presign", err))?;
        Ok(request.uri().to_string())
    }
}
