//! Waiting for a screenshot to finish being written.
//!
//! Screenshot tools create the file first and write it afterwards, sometimes
//! in several chunks. A file counts as stable once its size is non-zero and
//! unchanged across two consecutive checks `settle` apart.

use derive_more::{Display, Error};
use exn::ResultExt;
use shotname_storage::error::ErrorKind as StorageErrorKind;
use shotname_storage::{FileInfo, WatchTarget};
use std::ops::Deref;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The size was still changing (or zero) after every check.
    #[display("file did not stop changing after {_0} checks")]
    Unsettled(#[error(not(source))] u32),
    /// The file disappeared while waiting.
    #[display("file disappeared before it settled")]
    Vanished,
    #[display("could not stat file")]
    Storage,
}

#[derive(Debug, Clone, Copy)]
pub struct StabilityGate {
    settle: Duration,
    max_checks: u32,
}

impl StabilityGate {
    /// `max_checks` is clamped to at least two; one check can't observe a
    /// size staying the same.
    pub fn new(settle: Duration, max_checks: u32) -> Self {
        Self { settle, max_checks: max_checks.max(2) }
    }

    /// Blocks (asynchronously) until `path` is stable, returning its final
    /// metadata.
    #[instrument(level = "debug", skip(self, target), fields(path = %path.display()))]
    pub async fn wait(&self, target: &WatchTarget, path: &Path) -> Result<FileInfo> {
        let mut previous = stat(target, path).await?;
        for check in 2..=self.max_checks {
            tokio::time::sleep(self.settle).await;
            let current = stat(target, path).await?;
            if current.size > 0 && current.size == previous.size {
                tracing::debug!(size = current.size, checks = check, "File is stable");
                return Ok(current);
            }
            previous = current;
        }
        exn::bail!(ErrorKind::Unsettled(self.max_checks));
    }
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 10)
    }
}

async fn stat(target: &WatchTarget, path: &Path) -> Result<FileInfo> {
    match target.stat(path).await {
        Ok(info) => Ok(info),
        Err(e) if matches!(e.deref(), StorageErrorKind::NotFound(_)) => Err(e.raise(ErrorKind::Vanished)),
        Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
    }
}
