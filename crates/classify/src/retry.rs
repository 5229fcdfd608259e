//! Bounded retries for transient classification failures.

use crate::error::Result;
use crate::{Classifier, ClassifierHandle, Description};
use async_trait::async_trait;
use std::time::Duration;

/// Wraps a classifier, retrying failures that
/// [`is_retryable`](crate::error::ErrorKind::is_retryable) up to `retries`
/// extra times with exponential backoff. Permanent failures (bad request,
/// undecodable image, empty description) are returned immediately.
///
/// With `retries == 0` this is exactly one attempt.
pub struct Retrying {
    inner: ClassifierHandle,
    retries: u32,
    backoff: Duration,
}

impl Retrying {
    pub fn new(inner: ClassifierHandle, retries: u32, backoff: Duration) -> Self {
        Self { inner, retries, backoff }
    }
}

#[async_trait]
impl Classifier for Retrying {
    async fn classify(&self, image: &[u8]) -> Result<Description> {
        let mut attempt = 0;
        loop {
            match self.inner.classify(image).await {
                Ok(description) => return Ok(description),
                Err(e) if attempt < self.retries && e.is_retryable() => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(attempt, retries = self.retries, delay_ms = delay.as_millis() as u64, error = %*e, "Transient classification failure; retrying");
                    tokio::time::sleep(delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed script of results.
    struct Scripted(Mutex<VecDeque<std::result::Result<&'static str, ErrorKind>>>);

    impl Scripted {
        fn new(script: impl IntoIterator<Item = std::result::Result<&'static str, ErrorKind>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(script.into_iter().collect())))
        }

        fn remaining(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Classifier for Scripted {
        async fn classify(&self, _image: &[u8]) -> Result<Description> {
            match self.0.lock().unwrap().pop_front().expect("script exhausted") {
                Ok(text) => Ok(Description::new(text).unwrap()),
                Err(kind) => Err(kind.into()),
            }
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let script = Scripted::new([Err(ErrorKind::RateLimited), Err(ErrorKind::Transport), Ok("a cat")]);
        let classifier = Retrying::new(script.clone(), 2, Duration::from_millis(1));
        assert_eq!(classifier.classify(b"img").await.unwrap().as_str(), "a cat");
        assert_eq!(script.remaining(), 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let script = Scripted::new([Err(ErrorKind::RateLimited), Err(ErrorKind::RateLimited), Ok("unreached")]);
        let classifier = Retrying::new(script.clone(), 1, Duration::from_millis(1));
        assert_eq!(*classifier.classify(b"img").await.unwrap_err(), ErrorKind::RateLimited);
        assert_eq!(script.remaining(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let bad_request = ErrorKind::Api { status: 400, message: "invalid image".into() };
        let script = Scripted::new([Err(bad_request.clone()), Ok("unreached")]);
        let classifier = Retrying::new(script.clone(), 3, Duration::from_millis(1));
        assert_eq!(*classifier.classify(b"img").await.unwrap_err(), bad_request);
        assert_eq!(script.remaining(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let script = Scripted::new([Err(ErrorKind::Transport), Ok("unreached")]);
        let classifier = Retrying::new(script.clone(), 0, Duration::from_millis(1));
        assert!(classifier.classify(b"img").await.is_err());
        assert_eq!(script.remaining(), 1);
    }
}
