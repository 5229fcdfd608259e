//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// File already exists (for operations that require new files)
    #[display("file already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// The watch target is missing, unreadable, or not a directory
    #[display("not a readable directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Source and destination live on different volumes; moving would
    /// require copy+delete, which is refused.
    #[display("refusing cross-volume move: {}", _0.display())]
    CrossDevice(#[error(not(source))] PathBuf),
    /// File name is empty, contains separators or other illegal characters,
    /// or lies outside the watch target
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The platform comment tool failed or is unavailable
    #[display("could not write comment: {_0}")]
    Comment(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::AlreadyExists(_))
    }

    /// Maps an I/O error onto an actionable category for the given path.
    pub fn from_io(e: IoError, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            std::io::ErrorKind::CrossesDevices => Self::CrossDevice(path),
            _ => Self::Io(e),
        }
    }
}
