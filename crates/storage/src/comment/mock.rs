//! In-memory comment writer for testing.

use super::CommentWriter;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Records comments instead of writing them, or fails every write when
/// constructed with [`MockComments::failing`].
///
/// # Examples
///
/// ```
/// use shotname_storage::comment::{CommentWriter, MockComments};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let comments = MockComments::default();
/// comments.set_comment(Path::new("/shots/a.png"), "a cat").await.unwrap();
/// assert_eq!(comments.get(Path::new("/shots/a.png")).as_deref(), Some("a cat"));
/// # }
/// ```
#[derive(Default)]
pub struct MockComments {
    fail: bool,
    written: Mutex<HashMap<PathBuf, String>>,
}

impl MockComments {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// The comment recorded for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<String> {
        // The panic here is DELIBERATE: a poisoned lock means a test
        // already panicked.
        self.written.lock().expect("mock comment lock poisoned").get(path).cloned()
    }

    /// Number of comments recorded.
    pub fn len(&self) -> usize {
        self.written.lock().expect("mock comment lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CommentWriter for MockComments {
    async fn set_comment(&self, path: &Path, text: &str) -> Result<()> {
        if self.fail {
            exn::bail!(ErrorKind::Comment("mock configured to fail".to_string()));
        }
        self.written.lock().expect("mock comment lock poisoned").insert(path.to_path_buf(), text.to_string());
        Ok(())
    }
}
