//! File mode bits and entry classification.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// POSIX `st_mode`: the `S_IFMT` type field plus permission bits.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("{_0:o}")]
#[serde(transparent)]
pub struct Mode(pub u32);

impl Mode {
    pub fn bits(self) -> u32 {
        self.0
    }

    /// The `S_IFMT` portion only.
    pub fn file_type(self) -> u32 {
        self.0 & S_IFMT
    }

    pub fn permissions(self) -> u32 {
        self.0 & !S_IFMT
    }

    pub fn is_dir(self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn entry_type(self) -> EntryType {
        EntryType::from(self)
    }
}

#[cfg(unix)]
impl From<&Metadata> for Mode {
    fn from(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self(metadata.mode())
    }
}

#[cfg(not(unix))]
impl From<&Metadata> for Mode {
    fn from(metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        Self::synthesize(
            file_type.is_dir(),
            file_type.is_symlink(),
            file_type.is_file(),
            metadata.permissions().readonly(),
        )
    }
}

impl Mode {
    /// Build `st_mode`-like bits on platforms that don't report them.
    /// Anything that is neither a directory, link nor regular file gets a
    /// FIFO type so it classifies as [`EntryType::Other`].
    #[cfg_attr(unix, allow(dead_code))]
    fn synthesize(dir: bool, symlink: bool, file: bool, readonly: bool) -> Self {
        let bits = match (dir, symlink, file) {
            (true, _, _) => S_IFDIR | 0o755,
            (_, true, _) => S_IFLNK | 0o777,
            (_, _, true) => S_IFREG | 0o644,
            _ => S_IFIFO | 0o644,
        };
        Self(if readonly { bits & !0o222 } else { bits })
    }
}

/// What kind of entry a record describes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    SymLink,
    Directory,
    /// Reserved for archive expansion. Never produced by classification.
    Archive,
    Device,
    Other,
}

impl From<Mode> for EntryType {
    fn from(mode: Mode) -> Self {
        match mode.file_type() {
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::SymLink,
            S_IFBLK | S_IFCHR => Self::Device,
            // Some filesystems report no type at all for plain files.
            S_IFREG | 0 => Self::File,
            _ => Self::Other,
        }
    }
}
