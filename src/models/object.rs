//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Descriptor of a single object as returned by a bucket listing.
///
/// Carries metadata only; the content bytes are fetched separately through
/// `ObjectStore::get_object`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes, as reported by the store.
    pub size_bytes: u64,

    /// Content type (MIME type), when the backend includes it in listings.
    pub content_type: Option<String>,

    /// Entity tag reported by the store, without surrounding quotes.
    pub etag: Option<String>,

    /// Timestamp when object was last modified.
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid object key `{key}`: {reason}")]
pub struct InvalidObjectKey {
    pub key: String,
    pub reason: &'static str,
}

/// An object key supplied by a caller (the uploaded file name).
///
/// Rejects keys that begin with `/` or have a `.` or `..` path segment, along
/// with control characters and backslashes. Dots elsewhere in a name are fine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn parse(key: impl Into<String>) -> Result<Self, InvalidObjectKey> {
        let key = key.into();
        let reason = if key.is_empty() {
            Some("must not be empty")
        } else if key.len() > MAX_OBJECT_KEY_LEN {
            Some("must be at most 1024 bytes")
        } else if key.starts_with('/') || key.split('/').any(|s| s == "." || s == "..") {
            Some("must not start with `/` or contain `.` or `..` segments")
        } else if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            Some("must not contain control characters or backslashes")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidObjectKey { key, reason }),
            None => Ok(Self(key)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
