//! Error types for the [`naming`](super) module.

use derive_more::{Display, Error};

/// A naming error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for naming operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Every suffix up to the attempt limit was already taken.
    #[display("no free file name after {_0} attempts")]
    Exhausted(#[error(not(source))] u32),
    /// The date prefix could not be rendered.
    #[display("could not format date prefix")]
    Date,
    /// Checking whether a candidate name exists failed.
    #[display("could not check candidate name")]
    Storage,
}
