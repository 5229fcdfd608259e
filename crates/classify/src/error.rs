//! Classification Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A classification error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for classification operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a description could not be obtained.
///
/// Every variant leaves the image untouched; callers decide whether a retry
/// is worthwhile with [`is_retryable`](Self::is_retryable).
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[display("transport failure")]
    Transport,
    /// The service answered with HTTP 429.
    #[display("rate limited")]
    RateLimited,
    /// The service answered with a non-success status.
    #[display("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
    },
    /// The response could not be decoded.
    #[display("malformed response")]
    Response,
    /// The response contained no usable text.
    #[display("empty description")]
    EmptyDescription,
    /// The image could not be decoded or re-encoded before upload.
    #[display("image could not be prepared for upload")]
    Image,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport | Self::RateLimited => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Response | Self::EmptyDescription | Self::Image => false,
        }
    }
}
