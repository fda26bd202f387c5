use crate::error::{ErrorKind, Result};
use crate::record::ScannedRecord;
use crate::walk::Walker;
use dfind_asyncutils::{CancellationToken, DEFAULT_CAPACITY, Feed, bounded_with_token};
use dfind_storage::error::ErrorKind as StorageErrorKind;
use dfind_storage::{StorageDriver, Store};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when an entry cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Emit the error record, then stop the whole traversal.
    #[default]
    Halt,
    /// Emit the error record and carry on with the next entry.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Stat through symlinks and descend into linked directories.
    pub follow_symlinks: bool,
    /// Do not descend into directories on a different device than the root.
    pub one_filesystem: bool,
    pub on_error: ErrorPolicy,
    /// Records buffered ahead of the consumer before the walk suspends.
    pub capacity: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            one_filesystem: false,
            on_error: ErrorPolicy::default(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Counts from a [`Scanner::scan_insert`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records received from the walk, including error records.
    pub visited: u64,
    pub inserted: u64,
    /// Entries the walk could not read.
    pub unreadable: u64,
    /// Records the store refused.
    pub rejected: u64,
    pub cancelled: bool,
}

/// Walks a directory tree on a background task.
///
/// # Examples
///
/// ```no_run
/// use dfind_scan::{ScanOptions, Scanner};
/// use futures::StreamExt;
///
/// # async fn example() {
/// let scanner = Scanner::new("/srv/data", ScanOptions::default());
/// let mut records = scanner.scan();
/// while let Some(record) = records.next().await {
///     println!("{}", record.path.display());
/// }
/// # }
/// ```
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
    token: CancellationToken,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self { root: root.into(), options, token: CancellationToken::new() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Cancelling this token stops every scan this scanner started.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start a traversal and return its feed straight away.
    ///
    /// Records arrive in visit order: depth-first, parents before children,
    /// siblings in byte-wise name order. The feed closes when the walk ends.
    /// Must be called from within a tokio runtime.
    pub fn scan(&self) -> Feed<ScannedRecord> {
        let (producer, feed) = bounded_with_token(self.options.capacity, self.token.child_token());
        let walker = Walker::new(self.root.clone(), self.options.clone());
        tokio::spawn(walker.run(producer));
        feed
    }

    /// Scan and force-insert every readable entry into `store`.
    ///
    /// Unreadable entries and records the store refuses are logged and
    /// counted, not returned.
    pub async fn scan_insert(&self, store: &Store) -> Result<ScanSummary> {
        if store.is_read_only() {
            return Err(exn::Exn::from(StorageErrorKind::ReadOnly).raise(ErrorKind::Storage));
        }
        tracing::info!(root = %self.root.display(), store = store.name(), "Scan started");
        let mut summary = ScanSummary::default();
        let mut records = self.scan();
        while let Some(record) = records.next().await {
            summary.visited += 1;
            if let Some(err) = record.error() {
                summary.unreadable += 1;
                tracing::warn!(path = %record.path.display(), error = ?err, "Unreadable entry");
                continue;
            }
            match insert(store, &record).await {
                Ok(()) => summary.inserted += 1,
                Err(err) => {
                    summary.rejected += 1;
                    tracing::warn!(path = %record.path.display(), error = ?err, "Could not store entry");
                },
            }
        }
        summary.cancelled = records.is_cancelled();
        tracing::info!(
            root = %self.root.display(),
            visited = summary.visited,
            inserted = summary.inserted,
            unreadable = summary.unreadable,
            rejected = summary.rejected,
            cancelled = summary.cancelled,
            "Scan finished"
        );
        Ok(summary)
    }
}

async fn insert(store: &Store, record: &ScannedRecord) -> Result<()> {
    let record = record.store_record()?;
    store.insert(&record.key, &record, true).await.map_err(|err| err.raise(ErrorKind::Storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::EntryType;
    use dfind_storage::driver::{Call, MockDriver};
    use rstest::rstest;
    use std::sync::Arc;

    async fn collect(scanner: &Scanner) -> Vec<ScannedRecord> {
        scanner.scan().collect().await
    }

    fn paths(records: &[ScannedRecord], root: &Path) -> Vec<String> {
        records
            .iter()
            .map(|record| record.path.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("b/inner/deep.txt"), b"").unwrap();
        std::fs::write(dir.path().join("b/z.txt"), b"").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_empty_directory_yields_only_root() {
        let dir = tempfile::tempdir().unwrap();
        let records = collect(&Scanner::new(dir.path(), ScanOptions::default())).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, dir.path());
        assert_eq!(records[0].entry_type(), Some(EntryType::Directory));
        assert!(records[0].error().is_none());
    }

    #[tokio::test]
    async fn test_preorder_lexical_walk() {
        let dir = tree();
        let records = collect(&Scanner::new(dir.path(), ScanOptions::default())).await;
        assert_eq!(
            paths(&records, dir.path()),
            vec!["", "a.txt", "b", "b/inner", "b/inner/deep.txt", "b/z.txt", "c.txt"]
        );
        assert!(records.iter().all(ScannedRecord::is_ok));
        assert_eq!(records[1].metadata().unwrap().size, 5);
    }

    #[cfg(unix)]
    #[rstest]
    #[case(ErrorPolicy::Halt, vec!["", "a.txt", "b-broken"])]
    #[case(ErrorPolicy::Skip, vec!["", "a.txt", "b-broken", "c.txt"])]
    #[tokio::test]
    async fn test_error_policy(#[case] on_error: ErrorPolicy, #[case] expected: Vec<&str>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("b-broken")).unwrap();
        std::fs::write(dir.path().join("c.txt"), b"").unwrap();
        let options = ScanOptions { follow_symlinks: true, on_error, ..ScanOptions::default() };
        let records = collect(&Scanner::new(dir.path(), options)).await;
        assert_eq!(paths(&records, dir.path()), expected);
        let errors: Vec<_> = records.iter().filter_map(ScannedRecord::error).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&**errors[0], ErrorKind::Access(_)));
        assert!(records[2].metadata().is_none());
    }

    #[cfg(unix)]
    #[rstest]
    #[case(ErrorPolicy::Halt, vec!["", "a.txt", "b", "b"])]
    #[case(ErrorPolicy::Skip, vec!["", "a.txt", "b", "b", "c.txt"])]
    #[tokio::test]
    async fn test_unlistable_directory(#[case] on_error: ErrorPolicy, #[case] expected: Vec<&str>) {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/hidden.txt"), b"").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"").unwrap();
        let locked = dir.path().join("b");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::read_dir(&locked).is_ok() {
            // Permissions don't apply (running as root).
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let options = ScanOptions { on_error, ..ScanOptions::default() };
        let records = collect(&Scanner::new(dir.path(), options)).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(paths(&records, dir.path()), expected);
        // The directory itself is readable, only its listing fails.
        assert_eq!(records[2].entry_type(), Some(EntryType::Directory));
        assert!(matches!(&**records[3].error().unwrap(), ErrorKind::Access(path) if *path == locked));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_reported_not_followed() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("b"), dir.path().join("d-link")).unwrap();
        let records = collect(&Scanner::new(dir.path(), ScanOptions::default())).await;
        let link = records.iter().find(|record| record.path.ends_with("d-link")).unwrap();
        assert_eq!(link.entry_type(), Some(EntryType::SymLink));
        assert_eq!(records.len(), 8);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycles_are_not_descended() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();
        let options = ScanOptions { follow_symlinks: true, ..ScanOptions::default() };
        let records = collect(&Scanner::new(dir.path(), options)).await;
        assert_eq!(paths(&records, dir.path()), vec!["", "sub", "sub/loop"]);
        assert_eq!(records[2].entry_type(), Some(EntryType::Directory));
    }

    #[tokio::test]
    async fn test_missing_root_is_a_single_error_record() {
        let dir = tempfile::tempdir().unwrap();
        let records = collect(&Scanner::new(dir.path().join("nope"), ScanOptions::default())).await;
        assert_eq!(records.len(), 1);
        assert!(records[0].error().is_some());
    }

    #[tokio::test]
    async fn test_cancelling_the_scanner_stops_the_walk() {
        let dir = tree();
        let scanner = Scanner::new(dir.path(), ScanOptions { capacity: 1, ..ScanOptions::default() });
        let mut records = scanner.scan();
        assert!(records.next().await.is_some());
        scanner.cancellation_token().cancel();
        assert!(records.is_cancelled());
        let rest: Vec<_> = records.collect().await;
        // At most what was already buffered when the token fired.
        assert!(rest.len() <= 1);
    }

    #[tokio::test]
    async fn test_scan_insert_into_sqlite() {
        let dir = tree();
        let data = tempfile::tempdir().unwrap();
        let store = Store::open(data.path(), false).await.unwrap();
        let summary = Scanner::new(dir.path(), ScanOptions::default()).scan_insert(&store).await.unwrap();
        assert_eq!(summary.visited, 7);
        assert_eq!(summary.inserted, 7);
        assert_eq!(summary.unreadable, 0);
        assert!(!summary.cancelled);

        let hits = store.search_all("DEEP", true, false).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].key.ends_with("deep.txt"));
        let stored = store.get(&hits[0].key).await.unwrap().unwrap();
        assert_eq!(stored.payload.attributes.map(|a| a.directory), Some(false));

        // A second scan replaces rather than conflicts.
        let again = Scanner::new(dir.path(), ScanOptions::default()).scan_insert(&store).await.unwrap();
        assert_eq!(again.inserted, 7);
        assert_eq!(again.rejected, 0);
        store.close().await;
    }

    #[tokio::test]
    async fn test_scan_insert_forces_every_record() {
        let dir = tree();
        let driver = Arc::new(MockDriver::default());
        let store = Store::new(driver.clone(), false);
        Scanner::new(dir.path(), ScanOptions::default()).scan_insert(&store).await.unwrap();
        let calls = driver.calls();
        assert_eq!(calls.len(), 7);
        assert!(calls.iter().all(|call| matches!(call, Call::Insert { force: true, .. })));
    }

    #[tokio::test]
    async fn test_scan_insert_refuses_read_only_store() {
        let dir = tree();
        let driver = Arc::new(MockDriver::default());
        let store = Store::new(driver.clone(), true);
        let err = Scanner::new(dir.path(), ScanOptions::default()).scan_insert(&store).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));
        assert!(driver.calls().is_empty());
    }
}
