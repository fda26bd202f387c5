//! Scan Error Types
//!
//! Traversal failures are not returned from the walk; they travel inside
//! [`ScannedRecord`](crate::ScannedRecord)s so a consumer sees them in visit
//! order alongside the successful entries.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A scan error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An entry could not be stat'ed or a directory could not be listed.
    #[display("cannot access {}", _0.display())]
    Access(#[error(not(source))] PathBuf),
    /// The path cannot be used as a store key.
    #[display("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(#[error(not(source))] PathBuf),
    /// The store refused the scan as a whole.
    #[display("store rejected the scan")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Access(_) => true,
            Self::NonUtf8Path(_) | Self::Storage => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::Access(PathBuf::from("/root/secret")).to_string(), "cannot access /root/secret");
        assert_eq!(ErrorKind::Storage.to_string(), "store rejected the scan");
    }
}
