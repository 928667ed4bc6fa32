//! Bucket-to-zip aggregation.
//!
//! `build_archive` walks a bucket listing once, copies every object into its
//! own zip entry and returns the sealed archive as one buffer. The operation is
//! all-or-nothing: any listing, read or write failure discards the partially
//! built archive.
//!
//! Each object's body stream is opened, drained into its entry and dropped
//! before the next object is opened, so at most one backend read is in flight
//! per request. Everything runs inside the caller's future; dropping that
//! future (for example when the HTTP client disconnects) aborts the in-flight
//! read and frees the buffer.
//!
//! The archive is fully materialized in memory, so a request costs
//! O(total bucket bytes). `ArchiveLimits::max_archive_bytes` caps that.

use crate::{
    models::{bucket::BucketName, object::ObjectInfo},
    services::store::{ObjectStore, StoreError},
};
use chrono::{DateTime, Datelike, Timelike, Utc};
use futures::StreamExt;
use std::io::{Cursor, Write};
use thiserror::Error;
use tracing::debug;
use zip::{
    CompressionMethod, ZipWriter,
    result::ZipError,
    write::SimpleFileOptions,
};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("bucket `{0}` not found")]
    NotFound(String),
    #[error("listing bucket `{bucket}` failed: {source}")]
    List {
        bucket: String,
        #[source]
        source: StoreError,
    },
    #[error("reading object `{key}` failed: {source}")]
    Read {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("writing archive entry `{key}` failed: {source}")]
    Entry {
        key: String,
        #[source]
        source: ZipError,
    },
    #[error("archive exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("finalizing archive failed: {0}")]
    Finalize(#[source] ZipError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveLimits {
    /// Upper bound on the uncompressed bytes copied into one archive.
    pub max_archive_bytes: Option<u64>,
}

/// A finished archive and what went into it.
#[derive(Debug)]
pub struct Archive {
    pub bytes: Vec<u8>,
    pub entries: usize,
    /// Uncompressed bytes copied from the store.
    pub content_bytes: u64,
}

/// Zip every object of `bucket`, one entry per key, in listing order.
pub async fn build_archive(
    store: &dyn ObjectStore,
    bucket: &BucketName,
    limits: ArchiveLimits,
) -> Result<Archive, ArchiveError> {
    if !store.bucket_exists(bucket).await? {
        return Err(ArchiveError::NotFound(bucket.to_string()));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries = 0usize;
    let mut content_bytes = 0u64;

    let mut listing = store.list_objects(bucket);
    while let Some(item) = listing.next().await {
        let info = item.map_err(|source| ArchiveError::List {
            bucket: bucket.to_string(),
            source,
        })?;
        let copied = copy_entry(store, bucket, &info, &mut writer, content_bytes, limits).await?;
        content_bytes += copied;
        entries += 1;
    }

    let bytes = writer.finish().map_err(ArchiveError::Finalize)?.into_inner();
    debug!(bucket = %bucket, entries, content_bytes, archive_bytes = bytes.len(), "archive sealed");

    Ok(Archive {
        bytes,
        entries,
        content_bytes,
    })
}

/// Copy one object into a new entry and return the number of bytes copied.
///
/// The object's body stream lives only for the duration of this call.
async fn copy_entry(
    store: &dyn ObjectStore,
    bucket: &BucketName,
    info: &ObjectInfo,
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    already_copied: u64,
    limits: ArchiveLimits,
) -> Result<u64, ArchiveError> {
    let entry_error = |source: ZipError| ArchiveError::Entry {
        key: info.key.clone(),
        source,
    };

    let mut body = store
        .get_object(bucket, &info.key)
        .await
        .map_err(|source| ArchiveError::Read {
            key: info.key.clone(),
            source,
        })?;

    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(info.size_bytes >= ZIP64_THRESHOLD);
    if let Some(modified) = info.last_modified.as_ref().and_then(entry_timestamp) {
        options = options.last_modified_time(modified);
    }
    writer
        .start_file(info.key.as_str(), options)
        .map_err(entry_error)?;

    let mut copied = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| ArchiveError::Read {
            key: info.key.clone(),
            source,
        })?;
        copied += chunk.len() as u64;
        if let Some(limit) = limits.max_archive_bytes {
            if already_copied + copied > limit {
                return Err(ArchiveError::TooLarge { limit });
            }
        }
        writer
            .write_all(&chunk)
            .map_err(|err| entry_error(ZipError::Io(err)))?;
    }

    debug!(
        bucket = %bucket,
        key = %info.key,
        bytes = copied,
        content_type = info.content_type.as_deref(),
        etag = info.etag.as_deref(),
        "archived object"
    );
    Ok(copied)
}

/// DOS timestamp for an entry; `None` outside the 1980..=2107 range zip can hold.
fn entry_timestamp(modified: &DateTime<Utc>) -> Option<zip::DateTime> {
    zip::DateTime::from_date_and_time(
        u16::try_from(modified.year()).ok()?,
        modified.month() as u8,
        modified.day() as u8,
        modified.hour() as u8,
        modified.minute() as u8,
        modified.second() as u8,
    )
    .ok()
}
