use crate::Context;
use crate::naming::error::ErrorKind as NamingErrorKind;
use crate::process::error::{ErrorKind as ProcessErrorKind, Result as ProcessResult};
use exn::ResultExt;
use shotname_storage::error::ErrorKind as StorageErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use time::Date;

/// The name a file would get right now, without moving it.
pub(crate) async fn plan(ctx: &Context, date: Date, slug: &str, extension: &str) -> ProcessResult<String> {
    match ctx.naming.synthesize(&ctx.target, date, slug, extension).await {
        Ok(name) => Ok(name),
        Err(e) if matches!(e.deref(), NamingErrorKind::Exhausted(_)) => Err(e.raise(ProcessErrorKind::NameExhaustion)),
        Err(e) => Err(e).or_raise(|| ProcessErrorKind::Storage),
    }
}

/// Moves `from` to a freshly synthesized name, never overwriting anything.
///
/// Synthesizing a name and claiming it are separate steps, so another writer
/// can take the name in between. When that happens the name is synthesized
/// again (it will now pick the next suffix) and the move retried, at most
/// `max_collision_retries` more times.
pub(crate) async fn rename_into_place(
    ctx: &Context,
    from: &Path,
    date: Date,
    slug: &str,
    extension: &str,
) -> ProcessResult<PathBuf> {
    for attempt in 0..=ctx.max_collision_retries {
        let name = plan(ctx, date, slug, extension).await?;
        match ctx.target.rename_no_clobber(from, &name).await {
            Ok(to) => return Ok(to),
            Err(e) if matches!(e.deref(), StorageErrorKind::AlreadyExists(_)) => {
                tracing::debug!(attempt, name, "Name was taken before the rename; choosing another");
            },
            Err(e) => return Err(e).or_raise(|| ProcessErrorKind::Storage),
        }
    }
    exn::bail!(ProcessErrorKind::Collision);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotname_classify::MockClassifier;
    use shotname_storage::WatchTarget;
    use std::sync::Arc;
    use time::macros::date;

    fn context(dir: &Path, retries: u32) -> Context {
        let target = WatchTarget::open(dir).unwrap();
        Context::new(target, Arc::new(MockClassifier::describing("unused"))).with_max_collision_retries(retries)
    }

    #[tokio::test]
    async fn test_rename_into_free_name() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 0);
        let from = ctx.target.join("Screenshot.png").unwrap();
        std::fs::write(&from, b"image").unwrap();

        let to = rename_into_place(&ctx, &from, date!(2024 - 01 - 08), "login-page", "png").await.unwrap();
        assert_eq!(to, ctx.target.join("2024-01-08_login-page.png").unwrap());
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"image");
    }

    #[tokio::test]
    async fn test_rename_skips_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 0);
        std::fs::write(dir.path().join("2024-01-08_login-page.png"), b"first").unwrap();
        let from = ctx.target.join("Screenshot.png").unwrap();
        std::fs::write(&from, b"second").unwrap();

        let to = rename_into_place(&ctx, &from, date!(2024 - 01 - 08), "login-page", "png").await.unwrap();
        assert_eq!(to, ctx.target.join("2024-01-08_login-page-1.png").unwrap());
        assert_eq!(std::fs::read(dir.path().join("2024-01-08_login-page.png")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_rename_exhausted_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = WatchTarget::open(dir.path()).unwrap();
        let ctx = Context::new(target, Arc::new(MockClassifier::describing("unused")))
            .with_naming(crate::NamingPolicy::new(60, 1, "screenshot"));
        std::fs::write(dir.path().join("2024-01-08_a.png"), b"taken").unwrap();
        let from = ctx.target.join("Screenshot.png").unwrap();
        std::fs::write(&from, b"mine").unwrap();

        let err = rename_into_place(&ctx, &from, date!(2024 - 01 - 08), "a", "png").await.unwrap_err();
        assert!(matches!(err.deref(), ProcessErrorKind::NameExhaustion));
        assert_eq!(std::fs::read(&from).unwrap(), b"mine");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renames_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(dir.path(), 5));
        let mut handles = Vec::new();
        for i in 0..6 {
            let from = ctx.target.join(&format!("Screenshot {i}.png")).unwrap();
            std::fs::write(&from, format!("image {i}")).unwrap();
            let ctx = Arc::clone(&ctx);
            handles.push(tokio::spawn(async move {
                rename_into_place(&ctx, &from, date!(2024 - 01 - 08), "login-page", "png").await
            }));
        }
        let mut names = Vec::new();
        for handle in handles {
            let to = handle.await.unwrap().unwrap();
            names.push(to.file_name().unwrap().to_str().unwrap().to_string());
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
        assert!(names.contains(&"2024-01-08_login-page.png".to_string()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 6);
    }
}
