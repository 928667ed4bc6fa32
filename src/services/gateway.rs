//! GatewayService: the shared state behind every request.
//!
//! Holds the single object-store handle built at startup together with the
//! tunables from `AppConfig`, and implements upload, presigned listing and
//! archive download on top of `ObjectStore`.

use crate::{
    models::{bucket::BucketName, object::ObjectKey},
    services::{
        archive::{self, Archive, ArchiveError, ArchiveLimits},
        store::{ObjectStore, StoreResult},
    },
};
use bytes::Bytes;
use futures::TryStreamExt;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Clone)]
pub struct GatewayService {
    store: Arc<dyn ObjectStore>,
    presign_ttl: Duration,
    archive_limits: ArchiveLimits,
}

impl GatewayService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        presign_ttl: Duration,
        archive_limits: ArchiveLimits,
    ) -> Self {
        Self {
            store,
            presign_ttl,
            archive_limits,
        }
    }

    /// Store an uploaded file, creating the bucket first if it is missing.
    pub async fn upload(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()> {
        let size = body.len();
        self.store.ensure_bucket(bucket).await?;
        self.store
            .put_object(bucket, key.as_str(), body, content_type)
            .await?;
        info!(bucket = %bucket, key = %key, size, content_type, "object uploaded");
        Ok(())
    }

    /// Presigned GET URLs for every object in the bucket, in listing order.
    ///
    /// A bucket that does not exist has no objects, so it yields an empty list.
    pub async fn presigned_urls(&self, bucket: &BucketName) -> StoreResult<Vec<String>> {
        if !self.store.bucket_exists(bucket).await? {
            debug!(bucket = %bucket, "bucket missing, nothing to list");
            return Ok(Vec::new());
        }

        let mut urls = Vec::new();
        let mut listing = self.store.list_objects(bucket);
        while let Some(object) = listing.try_next().await? {
            let url = self
                .store
                .presigned_get_url(bucket, &object.key, self.presign_ttl)
                .await?;
            urls.push(url);
        }
        info!(bucket = %bucket, count = urls.len(), "presigned object urls");
        Ok(urls)
    }

    /// Zip the whole bucket.
    pub async fn download_archive(&self, bucket: &BucketName) -> Result<Archive, ArchiveError> {
        let archive = archive::build_archive(self.store.as_ref(), bucket, self.archive_limits).await?;
        info!(
            bucket = %bucket,
            entries = archive.entries,
            content_bytes = archive.content_bytes,
            archive_bytes = archive.bytes.len(),
            "archive built"
        );
        Ok(archive)
    }
}
