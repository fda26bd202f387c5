//! Storage models.
//!
//! A [`StoreRecord`] is what gets persisted: a unique key (a filesystem path)
//! and a versioned [`Payload`]. The payload's JSON encoding is part of the
//! store's on-disk format, so changes to its shape must bump
//! [`PAYLOAD_VERSION`].

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// Current version of the payload encoding.
pub const PAYLOAD_VERSION: u32 = 1;

/// Basic filesystem attributes stored alongside a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// Size in bytes
    pub size: u64,
    /// POSIX `st_mode` (file type and permission bits)
    pub mode: u32,
    /// Last modification, in seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
    pub directory: bool,
}

/// Value stored for each key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

impl Payload {
    /// A payload that carries nothing but its version.
    pub fn empty() -> Self {
        Self { version: PAYLOAD_VERSION, attributes: None }
    }

    pub fn with_attributes(attributes: Attributes) -> Self {
        Self { version: PAYLOAD_VERSION, attributes: Some(attributes) }
    }

    pub(crate) fn encode(&self) -> Result<String> {
        serde_json::to_string(self).or_raise(|| ErrorKind::InvalidData("payload"))
    }

    pub(crate) fn decode(raw: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(raw).or_raise(|| ErrorKind::InvalidData("payload"))?;
        if payload.version > PAYLOAD_VERSION {
            exn::bail!(ErrorKind::InvalidData("payload version"));
        }
        Ok(payload)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

/// A persisted unit: one key and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    /// Primary identity, unique per store
    pub key: String,
    pub payload: Payload,
}

impl StoreRecord {
    /// Create a record with an empty payload.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), payload: Payload::empty() }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Lowercase projection of the key, used for case-insensitive lookups.
    pub fn lc_key(&self) -> String {
        lowercase(&self.key)
    }
}

/// Lowercase one character at a time. `str::to_lowercase` picks a final
/// sigma from context, which would make a folded pattern disagree with the
/// folded key it is a substring of.
pub(crate) fn lowercase(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// A key matched by a search. Carries no metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchHit {
    pub key: String,
}

impl SearchHit {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_encoding_is_stable() {
        let payload = Payload::with_attributes(Attributes {
            size: 12,
            mode: 0o100644,
            modified: Some(1_700_000_000),
            directory: false,
        });
        assert_eq!(
            payload.encode().unwrap(),
            r#"{"version":1,"attributes":{"size":12,"mode":33188,"modified":1700000000,"directory":false}}"#
        );
        assert_eq!(Payload::empty().encode().unwrap(), r#"{"version":1}"#);
    }

    #[test]
    fn test_payload_decode() {
        let payload = Payload::decode(r#"{"version":1,"attributes":{"size":3,"mode":16877,"directory":true}}"#).unwrap();
        let attributes = payload.attributes.unwrap();
        assert!(attributes.directory);
        assert_eq!(attributes.modified, None);
    }

    #[test]
    fn test_payload_from_the_future_is_rejected() {
        let err = Payload::decode(r#"{"version":2}"#).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("payload version")));
        let err = Payload::decode("not json").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("payload")));
    }

    #[test]
    fn test_lc_key() {
        assert_eq!(StoreRecord::new("/A/B.TXT").lc_key(), "/a/b.txt");
        assert_eq!(StoreRecord::new("/ΟΔΟΣ").lc_key(), "/οδοσ");
    }
}
