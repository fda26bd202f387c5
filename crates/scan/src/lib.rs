//! Filesystem traversal.
//!
//! A [`Scanner`] walks a directory tree on a background task and streams one
//! [`ScannedRecord`] per visited entry over a bounded feed.
//! [`Scanner::scan_insert`] drains that feed into a [`Store`](dfind_storage::Store).

pub mod error;
pub mod mode;
mod record;
mod scanner;
mod walk;

pub use crate::mode::{EntryType, Mode};
pub use crate::record::{FileMetadata, ScannedRecord};
pub use crate::scanner::{ErrorPolicy, ScanOptions, ScanSummary, Scanner};
