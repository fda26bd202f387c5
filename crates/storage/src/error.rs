//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The store could not be opened. Fatal; not worth retrying.
    #[display("cannot open store: {}", _0.display())]
    Setup(#[error(not(source))] PathBuf),
    /// The schema could not be created on a freshly opened store.
    #[display("store provisioning failed")]
    Provision,
    /// A record already exists under this key and the insert was not forced.
    #[display("record already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// Mutating call against a store opened read-only.
    #[display("store is read-only")]
    ReadOnly,
    /// The key passed alongside a record is not the record's own key.
    #[display("key `{key}` does not match record key `{record}`")]
    KeyMismatch { key: String, record: String },
    /// A search could not be started, or failed part-way through.
    #[display("query failed")]
    Query,
    /// Any other database failure during a read or write.
    #[display("database error")]
    Database,
    /// Stored (or about to be stored) data could not be converted.
    #[display("invalid record data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Query | Self::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::AlreadyExists("/a/b.txt".to_string()), "record already exists: /a/b.txt")]
    #[case(ErrorKind::ReadOnly, "store is read-only")]
    #[case(
        ErrorKind::KeyMismatch { key: "/a".to_string(), record: "/b".to_string() },
        "key `/a` does not match record key `/b`"
    )]
    #[case(ErrorKind::Setup(PathBuf::from("/tmp/dfind.sq3")), "cannot open store: /tmp/dfind.sq3")]
    fn test_display(#[case] kind: ErrorKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Database.is_retryable());
        assert!(ErrorKind::Query.is_retryable());
        assert!(!ErrorKind::ReadOnly.is_retryable());
        assert!(!ErrorKind::AlreadyExists(String::new()).is_retryable());
    }
}
