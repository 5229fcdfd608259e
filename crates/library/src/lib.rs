//! The screenshot renaming pipeline.
//!
//! Files in a [`WatchTarget`] are picked up either once ([`process_directory`])
//! or continuously as they appear ([`watch`]). Each one waits at the
//! [`StabilityGate`], is described by a [`Classifier`](shotname_classify::Classifier),
//! gets a name from the [`NamingPolicy`], is moved there without ever
//! overwriting another file, and finally has the description attached as a
//! comment.

pub mod error;
mod filter;
pub mod naming;
pub mod process;
pub mod stability;
pub mod watch;

pub use crate::filter::{Candidates, is_renamed};
pub use crate::naming::NamingPolicy;
pub use crate::process::{Action, BatchEvent, SkipReason, process_directory, process_file};
pub use crate::stability::StabilityGate;
pub use crate::watch::watch;

use crate::error::Result as LibraryResult;
use shotname_classify::ClassifierHandle;
use shotname_storage::{CommentHandle, WatchTarget};
use std::sync::Arc;
use time::UtcOffset;

/// Default number of files processed at once.
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Default number of times a rename is retried after losing a name to
/// another writer.
pub const DEFAULT_COLLISION_RETRIES: u32 = 5;

/// Everything a pipeline run needs. Shared by every file in the run.
pub struct Context {
    pub target: Arc<WatchTarget>,
    pub classifier: ClassifierHandle,
    /// `None` disables tagging.
    pub comments: Option<CommentHandle>,
    pub filter: Candidates,
    pub naming: NamingPolicy,
    pub stability: StabilityGate,
    pub max_collision_retries: u32,
    pub concurrency: usize,
    /// Offset the capture date is computed in. Determined once at startup,
    /// while the process is still single-threaded.
    pub utc_offset: UtcOffset,
    pub dry_run: bool,
}

impl Context {
    pub fn new(target: impl Into<Arc<WatchTarget>>, classifier: ClassifierHandle) -> Self {
        Self {
            target: target.into(),
            classifier,
            comments: None,
            filter: Candidates::default(),
            naming: NamingPolicy::default(),
            stability: StabilityGate::default(),
            max_collision_retries: DEFAULT_COLLISION_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            utc_offset: UtcOffset::UTC,
            dry_run: false,
        }
    }

    pub fn with_comments(mut self, comments: CommentHandle) -> Self {
        self.comments = Some(comments);
        self
    }

    pub fn without_comments(mut self) -> Self {
        self.comments = None;
        self
    }

    pub fn with_filter(mut self, filter: Candidates) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_stability(mut self, stability: StabilityGate) -> Self {
        self.stability = stability;
        self
    }

    pub fn with_max_collision_retries(mut self, retries: u32) -> Self {
        self.max_collision_retries = retries;
        self
    }

    /// Clamped to at least one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Counts of per-file outcomes over a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub renamed: u64,
    pub planned: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl Tally {
    /// Logs one file's outcome and counts it.
    pub fn record(&mut self, result: &LibraryResult<Action>) {
        match result {
            Ok(Action::Renamed { from, to, tagged, .. }) => {
                self.renamed += 1;
                tracing::info!(from = %from.display(), to = %to.display(), tagged, "Renamed");
            },
            Ok(Action::Planned { from, to, description }) => {
                self.planned += 1;
                tracing::info!(from = %from.display(), to = %to.display(), %description, "Would rename (dry run)");
            },
            Ok(Action::Skipped { path, reason: SkipReason::NotCandidate }) => {
                self.skipped += 1;
                tracing::debug!(path = %path.display(), "Skipped: not a candidate");
            },
            Ok(Action::Skipped { path, reason }) => {
                self.skipped += 1;
                tracing::warn!(path = %path.display(), %reason, "Skipped");
            },
            Err(e) => {
                self.failed += 1;
                tracing::error!(error = ?e, "{}", **e);
            },
        }
    }

    pub fn total(&self) -> u64 {
        self.renamed + self.planned + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use shotname_classify::Description;
    use std::path::PathBuf;

    #[test]
    fn test_tally_counts_each_outcome() {
        let mut tally = Tally::default();
        let description = || Description::new("login page").unwrap();
        tally.record(&Ok(Action::Renamed {
            from: PathBuf::from("/a.png"),
            to: PathBuf::from("/b.png"),
            description: description(),
            tagged: true,
        }));
        tally.record(&Ok(Action::Planned {
            from: PathBuf::from("/a.png"),
            to: PathBuf::from("/b.png"),
            description: description(),
        }));
        tally.record(&Ok(Action::Skipped { path: PathBuf::from("/c.png"), reason: SkipReason::Unstable }));
        tally.record(&Err(ErrorKind::Process(PathBuf::from("/d.png")).into()));
        assert_eq!(tally, Tally { renamed: 1, planned: 1, skipped: 1, failed: 1 });
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = std::sync::Arc::new(shotname_classify::MockClassifier::describing("x"));
        let ctx = Context::new(WatchTarget::open(dir.path()).unwrap(), classifier).with_concurrency(0);
        assert_eq!(ctx.concurrency, 1);
    }
}
