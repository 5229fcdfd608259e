//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Per-file failures are raised as
//! [`ErrorKind::Process`] carrying the file's path, so a log line always says
//! which file failed; the module-specific error underneath says why.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// One file's pipeline failed. Isolated to that file.
    #[display("failed to process {}", _0.display())]
    Process(#[error(not(source))] PathBuf),
    /// The watch target could not be listed.
    #[display("could not list the watch target")]
    Scan,
    /// The file system watch could not be started or was lost mid-run.
    #[display("file system watch failed")]
    Watch,
}

impl ErrorKind {
    /// Returns `true` if the whole run is meaningless after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Scan | Self::Watch)
    }
}
