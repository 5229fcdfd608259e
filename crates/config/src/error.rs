//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A provider (file, environment) could not be read or didn't match the
    /// expected shape.
    #[display("could not load configuration")]
    Load,
    /// An explicitly requested configuration file doesn't exist.
    #[display("configuration file not found: {}", _0.display())]
    Missing(#[error(not(source))] PathBuf),
    /// Values were loaded but are out of range or inconsistent.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
