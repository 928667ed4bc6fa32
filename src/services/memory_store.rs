//! In-process object store.
//!
//! Keeps every bucket in a `BTreeMap` so listings come back in lexicographic
//! key order, like S3. Used for local development (`--backend memory`) and by
//! the test suite. Presigned URLs point at `public_url` and carry the expiry as
//! a query parameter; nothing serves them.

use crate::{
    models::{bucket::BucketName, object::ObjectInfo},
    services::store::{
        ObjectBody, ObjectListing, ObjectStore, StoreError, StoreResult, check_presign_ttl,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{TryStreamExt, stream};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Chunk size used when replaying stored bytes as a body stream.
const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug)]
struct StoredObject {
    body: Bytes,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size_bytes: self.body.len() as u64,
            content_type: Some(self.content_type.clone()),
            etag: Some(self.etag.clone()),
            last_modified: Some(self.last_modified),
        }
    }
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

#[derive(Clone)]
pub struct MemoryStore {
    buckets: Arc<RwLock<Buckets>>,
    public_url: Url,
}

impl MemoryStore {
    pub fn new(public_url: Url) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            public_url,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &BucketName) -> StoreResult<bool> {
        Ok(self.buckets.read().await.contains_key(bucket.as_str()))
    }

    async fn ensure_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        let mut buckets = self.buckets.write().await;
        if !buckets.contains_key(bucket.as_str()) {
            debug!(bucket = %bucket, "creating bucket");
            buckets.insert(bucket.to_string(), BTreeMap::new());
        }
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &BucketName,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()> {
        let etag = format!("{:x}", md5::compute(&body));
        let object = StoredObject {
            body,
            content_type: content_type.to_string(),
            etag,
            last_modified: Utc::now(),
        };

        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket.as_str())
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
        objects.insert(key.to_string(), object);
        Ok(())
    }

    fn list_objects(&self, bucket: &BucketName) -> ObjectListing {
        let buckets = self.buckets.clone();
        let bucket = bucket.to_string();
        // Snapshot taken on first poll; writers that land afterwards are not
        // reflected in this listing.
        let snapshot = async move {
            let guard = buckets.read().await;
            let objects = guard
                .get(&bucket)
                .ok_or_else(|| StoreError::BucketNotFound(bucket.clone()))?;
            Ok::<Vec<ObjectInfo>, StoreError>(
                objects.iter().map(|(key, obj)| obj.info(key)).collect(),
            )
        };
        Box::pin(
            stream::once(snapshot)
                .map_ok(|infos| stream::iter(infos.into_iter().map(Ok::<ObjectInfo, StoreError>)))
                .try_flatten(),
        )
    }

    async fn get_object(&self, bucket: &BucketName, key: &str) -> StoreResult<ObjectBody> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket.as_str())
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
        let object = objects
            .get(key)
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        let body = object.body.clone();
        let chunks: Vec<StoreResult<Bytes>> = (0..body.len())
            .step_by(READ_CHUNK_SIZE)
            .map(|start| Ok(body.slice(start..(start + READ_CHUNK_SIZE).min(body.len()))))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn presigned_get_url(
        &self,
        bucket: &BucketName,
        key: &str,
        ttl: Duration,
    ) -> StoreResult<String> {
        check_presign_ttl(ttl)?;

        let mut url = self.public_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Backend {
                operation: "presign",
                message: format!("public url `{}` cannot carry a path", self.public_url),
            })?
            .pop_if_empty()
            .push(bucket.as_str())
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("X-Amz-Expires", &ttl.as_secs().to_string());
        Ok(url.to_string())
    }
}
