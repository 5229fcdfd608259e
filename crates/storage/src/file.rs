//! File metadata as observed inside a watch target.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::OffsetDateTime;

/// A regular file observed inside a [`WatchTarget`](crate::WatchTarget).
///
/// This is a snapshot; `size` is the size at the time of the last check and
/// may be stale by the time it's read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Absolute path inside the watch target
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Earliest known timestamp for the file: creation time, or the
    /// modification time when that is older (copies that preserve mtime) or
    /// when the filesystem doesn't record creation time.
    pub created: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, created: OffsetDateTime) -> Self {
        Self { path: path.into(), size, created }
    }

    pub(crate) fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let created = [metadata.created().ok(), metadata.modified().ok()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or_else(SystemTime::now);
        Self::new(path, metadata.len(), created.into())
    }

    /// Final path component, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Lower-cased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

/// Lower-cased extension of `path` without the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}
