//! File name synthesis.
//!
//! A synthesized name looks like `2024-01-08_github-pull-request-review-page.png`:
//! the capture date, an underscore, a slug of the classifier's description
//! and the original (lowercased) extension. If that name is taken, `-1`,
//! `-2`, ... is appended to the slug until a free one is found.
//!
//! Checking for a free name is only advisory. The rename engine claims the
//! name atomically and comes back here if it lost a race.

pub mod error;
mod slug;

use self::error::{ErrorKind, Result};
use exn::ResultExt;
use shotname_storage::WatchTarget;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::instrument;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// How descriptions become file names.
#[derive(Debug, Clone)]
pub struct NamingPolicy {
    max_slug_length: usize,
    max_attempts: u32,
    fallback: String,
}

impl NamingPolicy {
    pub fn new(max_slug_length: usize, max_attempts: u32, fallback: impl Into<String>) -> Self {
        Self { max_slug_length, max_attempts, fallback: fallback.into() }
    }

    /// Slug of `description`: `[a-z0-9-]` only, at most `max_slug_length`
    /// bytes, the fallback word if nothing usable remains.
    pub fn slug(&self, description: &str) -> String {
        slug::slug(description, self.max_slug_length, &self.fallback)
    }

    /// The `n`th candidate name. `n == 0` is the unsuffixed name.
    pub fn candidate(&self, date: Date, slug: &str, n: u32, extension: &str) -> Result<String> {
        let date = date.format(DATE_FORMAT).or_raise(|| ErrorKind::Date)?;
        Ok(match n {
            0 => format!("{date}_{slug}.{extension}"),
            n => format!("{date}_{slug}-{n}.{extension}"),
        })
    }

    /// Returns the first candidate name not currently present in `target`.
    ///
    /// # Errors
    /// [`ErrorKind::Exhausted`] once `max_attempts` candidates have all been
    /// found taken.
    #[instrument(level = "debug", skip(self, target))]
    pub async fn synthesize(&self, target: &WatchTarget, date: Date, slug: &str, extension: &str) -> Result<String> {
        for n in 0..self.max_attempts {
            let name = self.candidate(date, slug, n, extension)?;
            if !target.exists(&name).await.or_raise(|| ErrorKind::Storage)? {
                return Ok(name);
            }
        }
        exn::bail!(ErrorKind::Exhausted(self.max_attempts));
    }
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::new(60, 1000, "screenshot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::ops::Deref;
    use time::macros::date;

    #[rstest]
    #[case(0, "2024-01-08_login-page.png")]
    #[case(1, "2024-01-08_login-page-1.png")]
    #[case(12, "2024-01-08_login-page-12.png")]
    fn test_candidate(#[case] n: u32, #[case] expected: &str) {
        let policy = NamingPolicy::default();
        assert_eq!(policy.candidate(date!(2024 - 01 - 08), "login-page", n, "png").unwrap(), expected);
    }

    #[test]
    fn test_candidate_pads_date() {
        let policy = NamingPolicy::default();
        assert_eq!(policy.candidate(date!(2024 - 03 - 04), "x", 0, "jpg").unwrap(), "2024-03-04_x.jpg");
    }

    #[tokio::test]
    async fn test_synthesize_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2024-01-08_login-page.png"), b"a").unwrap();
        std::fs::write(dir.path().join("2024-01-08_login-page-1.png"), b"b").unwrap();
        let target = WatchTarget::open(dir.path()).unwrap();

        let name = NamingPolicy::default().synthesize(&target, date!(2024 - 01 - 08), "login-page", "png").await.unwrap();
        assert_eq!(name, "2024-01-08_login-page-2.png");
    }

    #[tokio::test]
    async fn test_synthesize_other_extension_does_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2024-01-08_login-page.png"), b"a").unwrap();
        let target = WatchTarget::open(dir.path()).unwrap();

        let name = NamingPolicy::default().synthesize(&target, date!(2024 - 01 - 08), "login-page", "jpg").await.unwrap();
        assert_eq!(name, "2024-01-08_login-page.jpg");
    }

    #[tokio::test]
    async fn test_synthesize_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2024-01-08_a.png"), b"a").unwrap();
        std::fs::write(dir.path().join("2024-01-08_a-1.png"), b"b").unwrap();
        let target = WatchTarget::open(dir.path()).unwrap();

        let policy = NamingPolicy::new(60, 2, "screenshot");
        let err = policy.synthesize(&target, date!(2024 - 01 - 08), "a", "png").await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Exhausted(2)));
    }
}
