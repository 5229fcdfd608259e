//! Error types for the [`process`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which stage of a single file's pipeline failed.
///
/// Every variant leaves the file where it was, with its original name.
///
/// ### Operational Errors
/// - [`ErrorKind::NameExhaustion`]
/// - [`ErrorKind::Collision`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Classification`]
/// - [`ErrorKind::Storage`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The classifier failed or returned nothing usable.
    #[display("classification failed")]
    Classification,
    /// No free name within the naming policy's attempt limit.
    #[display("no free name for this file")]
    NameExhaustion,
    /// Another writer kept taking the chosen name.
    #[display("lost every race for a free name")]
    Collision,
    /// Reading, listing or moving the file failed.
    #[display("storage operation failed")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if processing the same file again later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Classification | Self::Collision)
    }
}
