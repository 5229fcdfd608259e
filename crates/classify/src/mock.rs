//! In-memory classifier for testing.

use crate::error::{ErrorKind, Result};
use crate::{Classifier, Description};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Classifier that answers from a lookup table keyed by image bytes, with an
/// optional fallback answer, and counts how often it was called.
///
/// # Examples
///
/// ```
/// use shotname_classify::{Classifier, MockClassifier};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let classifier = MockClassifier::describing("a terminal window").with_image(b"cat", "a cat");
/// assert_eq!(classifier.classify(b"cat").await.unwrap().as_str(), "a cat");
/// assert_eq!(classifier.classify(b"???").await.unwrap().as_str(), "a terminal window");
/// assert_eq!(classifier.calls(), 2);
/// # }
/// ```
#[derive(Default)]
pub struct MockClassifier {
    fallback: Option<std::result::Result<String, ErrorKind>>,
    images: HashMap<Vec<u8>, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockClassifier {
    /// Every unknown image gets `text`.
    pub fn describing(text: impl Into<String>) -> Self {
        Self { fallback: Some(Ok(text.into())), ..Self::default() }
    }

    /// Every unknown image fails with `kind`.
    pub fn failing(kind: ErrorKind) -> Self {
        Self { fallback: Some(Err(kind)), ..Self::default() }
    }

    /// Answers `text` for an image with exactly these bytes.
    pub fn with_image(mut self, bytes: impl Into<Vec<u8>>, text: impl Into<String>) -> Self {
        self.images.insert(bytes.into(), text.into());
        self
    }

    /// Simulated network latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of classify calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Description> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let text = match (self.images.get(image), &self.fallback) {
            (Some(text), _) => text.clone(),
            (None, Some(Ok(text))) => text.clone(),
            (None, Some(Err(kind))) => exn::bail!(kind.clone()),
            (None, None) => exn::bail!(ErrorKind::EmptyDescription),
        };
        match Description::new(text) {
            Some(description) => Ok(description),
            None => exn::bail!(ErrorKind::EmptyDescription),
        }
    }
}
