//! Image descriptions from a vision model.
//!
//! The [`Classifier`] trait is the seam between the renaming pipeline and the
//! external service: one image in, one free-text [`Description`] (or a typed
//! [`ErrorKind`](error::ErrorKind)) out. [`OpenAiClassifier`] talks to any
//! OpenAI-compatible chat completions endpoint; [`Retrying`] wraps another
//! classifier with a bounded retry policy for transient failures.

pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod openai;
mod prepare;
mod retry;

#[cfg(feature = "mock")]
pub use crate::mock::MockClassifier;
pub use crate::openai::{DEFAULT_ENDPOINT, DEFAULT_MODEL, OpenAiClassifier, PROMPT};
pub use crate::prepare::{DEFAULT_MAX_DIMENSION, prepare_image};
pub use crate::retry::Retrying;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub type ClassifierHandle = Arc<dyn Classifier + Send + Sync>;

/// Sends an image to a description service.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Describes the image encoded in `image` (the raw file contents).
    ///
    /// Makes a single attempt unless the implementation documents otherwise.
    async fn classify(&self, image: &[u8]) -> Result<Description>;
}

/// Free-text description of one image, as returned by the service.
///
/// Never empty or all-whitespace; construct with [`Description::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description(String);

impl Description {
    /// Trims `text`, returning `None` if nothing is left.
    pub fn new(text: impl AsRef<str>) -> Option<Self> {
        let text = text.as_ref().trim();
        match text.is_empty() {
            true => None,
            false => Some(Self(text.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for Description {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_trims() {
        let d = Description::new("  a GitHub pull request review page\n").unwrap();
        assert_eq!(d.as_str(), "a GitHub pull request review page");
        assert_eq!(d.to_string(), "a GitHub pull request review page");
    }

    #[test]
    fn test_description_rejects_blank() {
        assert!(Description::new("").is_none());
        assert!(Description::new(" \n\t ").is_none());
    }
}
