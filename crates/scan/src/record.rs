use crate::error::{Error, ErrorKind, Result};
use crate::mode::{EntryType, Mode};
use dfind_storage::{Attributes, Payload, StoreRecord};
use exn::OptionExt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Basic attributes of a visited entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// Size in bytes
    pub size: u64,
    pub mode: Mode,
    /// Not every platform or filesystem reports one
    pub modified: Option<OffsetDateTime>,
    pub directory: bool,
}

impl From<&Metadata> for FileMetadata {
    fn from(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            mode: Mode::from(metadata),
            modified: metadata.modified().ok().map(OffsetDateTime::from),
            directory: metadata.is_dir(),
        }
    }
}

impl From<&FileMetadata> for Attributes {
    fn from(metadata: &FileMetadata) -> Self {
        Attributes {
            size: metadata.size,
            mode: metadata.mode.bits(),
            modified: metadata.modified.map(OffsetDateTime::unix_timestamp),
            directory: metadata.directory,
        }
    }
}

/// One filesystem entry observed during a scan.
///
/// A record either describes an entry or a failure to reach it, never both.
/// The entry type is derived from the mode bits on every call.
#[derive(Debug)]
pub struct ScannedRecord {
    pub path: PathBuf,
    outcome: std::result::Result<FileMetadata, Error>,
    archive_error: Option<Error>,
    children: Vec<ScannedRecord>,
}

impl ScannedRecord {
    pub fn new(path: impl Into<PathBuf>, metadata: FileMetadata) -> Self {
        Self {
            path: path.into(),
            outcome: Ok(metadata),
            archive_error: None,
            children: Vec::new(),
        }
    }

    pub fn failed(path: impl Into<PathBuf>, error: Error) -> Self {
        Self {
            path: path.into(),
            outcome: Err(error),
            archive_error: None,
            children: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.outcome.as_ref().ok()
    }

    /// `None` for error records.
    pub fn entry_type(&self) -> Option<EntryType> {
        self.metadata().map(|metadata| metadata.mode.entry_type())
    }

    /// Failure to expand an archive. Archive expansion is not implemented,
    /// so this is always `None`.
    pub fn archive_error(&self) -> Option<&Error> {
        self.archive_error.as_ref()
    }

    /// Entries found inside an archive. Always empty for now.
    pub fn children(&self) -> &[ScannedRecord] {
        &self.children
    }

    /// Convert into the record persisted under this path.
    pub fn store_record(&self) -> Result<StoreRecord> {
        let key = self.path.to_str().ok_or_raise(|| ErrorKind::NonUtf8Path(self.path.clone()))?;
        let metadata = self.metadata().ok_or_raise(|| ErrorKind::Access(self.path.clone()))?;
        Ok(StoreRecord::new(key).with_payload(Payload::with_attributes(metadata.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{S_IFDIR, S_IFREG};

    fn file(size: u64) -> FileMetadata {
        FileMetadata {
            size,
            mode: Mode(S_IFREG | 0o644),
            modified: Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()),
            directory: false,
        }
    }

    #[test]
    fn test_entry_type_follows_mode() {
        let mut metadata = file(0);
        assert_eq!(ScannedRecord::new("/a", metadata).entry_type(), Some(EntryType::File));
        metadata.mode = Mode(S_IFDIR | 0o755);
        assert_eq!(ScannedRecord::new("/a", metadata).entry_type(), Some(EntryType::Directory));
    }

    #[test]
    fn test_failed_record_has_no_metadata() {
        let record = ScannedRecord::failed("/nope", exn::Exn::from(ErrorKind::Access(PathBuf::from("/nope"))));
        assert!(!record.is_ok());
        assert!(record.metadata().is_none());
        assert!(record.entry_type().is_none());
        assert!(matches!(&**record.error().unwrap(), ErrorKind::Access(_)));
        assert!(record.store_record().is_err());
    }

    #[test]
    fn test_archive_fields_are_empty() {
        let record = ScannedRecord::new("/a.zip", file(10));
        assert!(record.archive_error().is_none());
        assert!(record.children().is_empty());
    }

    #[test]
    fn test_store_record_carries_attributes() {
        let record = ScannedRecord::new("/a/b.txt", file(12)).store_record().unwrap();
        assert_eq!(record.key, "/a/b.txt");
        assert_eq!(
            record.payload.attributes,
            Some(Attributes { size: 12, mode: S_IFREG | 0o644, modified: Some(1_700_000_000), directory: false })
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let path = Path::new(OsStr::from_bytes(b"/tmp/\xff"));
        let err = ScannedRecord::new(path, file(0)).store_record().unwrap_err();
        assert!(matches!(&*err, ErrorKind::NonUtf8Path(_)));
    }
}
