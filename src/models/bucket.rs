//! Bucket names as accepted from HTTP callers.

use std::fmt;
use thiserror::Error;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("bucket `{name}` invalid: {reason}")]
pub struct InvalidBucketName {
    pub name: String,
    pub reason: &'static str,
}

/// A validated bucket name.
///
/// Buckets themselves live in the object store; this type only guarantees the
/// name follows S3 naming rules before it is handed to the backend:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BucketName(String);

impl BucketName {
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidBucketName> {
        let name = name.into();
        let invalid = |reason: &'static str| InvalidBucketName {
            name: name.clone(),
            reason,
        };

        if name.trim() != name {
            return Err(invalid("cannot begin or end with whitespace"));
        }

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(&name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
