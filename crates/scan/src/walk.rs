//! Depth-first traversal worker.

use crate::error::{ErrorKind, Result};
use crate::record::{FileMetadata, ScannedRecord};
use crate::scanner::{ErrorPolicy, ScanOptions};
use dfind_asyncutils::Producer;
use exn::ResultExt;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::Metadata;
use std::ops::ControlFlow;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

#[cfg(unix)]
type DirId = (u64, u64);
#[cfg(not(unix))]
type DirId = PathBuf;

pub(crate) struct Walker {
    root: PathBuf,
    options: ScanOptions,
    root_device: Option<u64>,
    visited: HashSet<DirId>,
}

impl Walker {
    pub(crate) fn new(root: PathBuf, options: ScanOptions) -> Self {
        Self { root, options, root_device: None, visited: HashSet::new() }
    }

    /// Walk the tree, sending one record per visited entry. Returns when the
    /// walk is complete, halted by an error, or cancelled; dropping the
    /// producer on return closes the feed.
    pub(crate) async fn run(mut self, producer: Producer<ScannedRecord>) {
        self.walk(&producer).await;
    }

    async fn walk(&mut self, producer: &Producer<ScannedRecord>) {
        let mut stack = vec![self.root.clone()];
        while let Some(path) = stack.pop() {
            if producer.is_cancelled() {
                tracing::debug!(root = %self.root.display(), "Scan cancelled");
                return;
            }
            if self.visit(path, &mut stack, producer).await.is_break() {
                return;
            }
        }
    }

    async fn visit(
        &mut self,
        path: PathBuf,
        stack: &mut Vec<PathBuf>,
        producer: &Producer<ScannedRecord>,
    ) -> ControlFlow<()> {
        let metadata = match self.stat(&path).await {
            Ok(metadata) => metadata,
            Err(err) => return self.fail(path, err, producer).await,
        };
        let is_root = stack.is_empty() && path == self.root && self.root_device.is_none();
        if is_root {
            self.root_device = Some(device(&metadata).unwrap_or_default());
        }
        let hidden = is_root && is_pseudo_dir(&path);
        if !hidden && !producer.send(ScannedRecord::new(&path, FileMetadata::from(&metadata))).await {
            return ControlFlow::Break(());
        }
        if !metadata.is_dir() || !self.should_descend(&path, &metadata).await {
            return ControlFlow::Continue(());
        }
        match read_sorted(&path).await {
            Ok(names) => {
                // Reversed so the lexically smallest name is popped first.
                stack.extend(names.into_iter().rev().map(|name| child_path(&path, name)));
                ControlFlow::Continue(())
            },
            Err(err) => self.fail(path, err, producer).await,
        }
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        let metadata = match self.options.follow_symlinks {
            true => fs::metadata(path).await,
            false => fs::symlink_metadata(path).await,
        };
        metadata.or_raise(|| ErrorKind::Access(path.to_path_buf()))
    }

    async fn should_descend(&mut self, path: &Path, metadata: &Metadata) -> bool {
        if self.options.one_filesystem
            && let (Some(root), Some(current)) = (self.root_device, device(metadata))
            && root != current
        {
            tracing::debug!(path = %path.display(), "Not crossing filesystem boundary");
            return false;
        }
        // Without following links the tree cannot loop back on itself.
        if !self.options.follow_symlinks {
            return true;
        }
        let Some(id) = dir_id(path, metadata).await else {
            return true;
        };
        if !self.visited.insert(id) {
            tracing::debug!(path = %path.display(), "Directory already visited; not descending");
            return false;
        }
        true
    }

    async fn fail(
        &self,
        path: PathBuf,
        error: crate::error::Error,
        producer: &Producer<ScannedRecord>,
    ) -> ControlFlow<()> {
        tracing::debug!(path = %path.display(), policy = ?self.options.on_error, "Traversal error");
        if !producer.send(ScannedRecord::failed(path, error)).await {
            return ControlFlow::Break(());
        }
        match self.options.on_error {
            ErrorPolicy::Halt => ControlFlow::Break(()),
            ErrorPolicy::Skip => ControlFlow::Continue(()),
        }
    }
}

/// `.` and `..` given as the root are walked but never reported.
fn is_pseudo_dir(path: &Path) -> bool {
    matches!(path.components().next_back(), Some(Component::CurDir | Component::ParentDir))
}

/// Children of a bare `.` root are reported as `a.txt`, not `./a.txt`.
fn child_path(dir: &Path, name: OsString) -> PathBuf {
    let mut components = dir.components();
    match (components.next(), components.next()) {
        (Some(Component::CurDir), None) => PathBuf::from(name),
        _ => dir.join(name),
    }
}

async fn read_sorted(path: &Path) -> Result<Vec<OsString>> {
    let mut entries = fs::read_dir(path).await.or_raise(|| ErrorKind::Access(path.to_path_buf()))?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Access(path.to_path_buf()))? {
        names.push(entry.file_name());
    }
    names.sort_unstable();
    Ok(names)
}

#[cfg(unix)]
fn device(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.dev())
}

#[cfg(not(unix))]
fn device(_metadata: &Metadata) -> Option<u64> {
    None
}

#[cfg(unix)]
async fn dir_id(_path: &Path, metadata: &Metadata) -> Option<DirId> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
async fn dir_id(path: &Path, _metadata: &Metadata) -> Option<DirId> {
    fs::canonicalize(path).await.ok()
}
