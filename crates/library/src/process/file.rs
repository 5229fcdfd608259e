use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::process::error::{ErrorKind as ProcessErrorKind, Result as ProcessResult};
use crate::process::rename::{plan, rename_into_place};
use crate::process::tag::tag;
use crate::stability::ErrorKind as StabilityErrorKind;
use derive_more::Display;
use exn::{OptionExt, ResultExt};
use shotname_classify::Description;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// The outcome of (successfully) processing a single file.
///
/// Failures are not an `Action`: they come back as `Err` from
/// [`process_file`], with the file untouched.
#[derive(Debug)]
pub enum Action {
    /// File was renamed. `tagged` is `false` if the description couldn't be
    /// attached as a comment.
    Renamed { from: PathBuf, to: PathBuf, description: Description, tagged: bool },
    /// Dry run: the name the file would have been given.
    Planned { from: PathBuf, to: PathBuf, description: Description },
    /// File was left alone without being classified.
    Skipped { path: PathBuf, reason: SkipReason },
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Hidden, wrong extension or already renamed.
    #[display("not a candidate")]
    NotCandidate,
    /// Still being written after every stability check.
    #[display("never stopped changing")]
    Unstable,
    /// Deleted or moved away before it could be processed.
    #[display("disappeared")]
    Vanished,
}

/// Runs one file through the whole pipeline: wait for it to settle, classify
/// it, rename it and tag it.
///
/// Takes one of three actions:
///
/// - **[`Action::Renamed`]**: the file now has a synthesized name.
/// - **[`Action::Planned`]**: dry run; nothing was touched.
/// - **[`Action::Skipped`]**: the file was not a candidate, never settled or
///   vanished. The classifier was not called.
///
/// # Errors
/// Returns [`Exn<LibraryErrorKind::Process>`](LibraryErrorKind::Process)
/// raised from an inner [`Exn<ProcessErrorKind>`](ProcessErrorKind). The file
/// keeps its original name.
#[instrument(skip(ctx), fields(path = %path.display()))]
pub async fn process_file(ctx: &Context, path: &Path) -> LibraryResult<Action> {
    process_file_inner(ctx, path).await.or_raise(|| LibraryErrorKind::Process(path.to_path_buf()))
}

pub(crate) async fn process_file_inner(ctx: &Context, path: &Path) -> ProcessResult<Action> {
    let skipped = |reason| -> ProcessResult<Action> { Ok(Action::Skipped { path: path.to_path_buf(), reason }) };
    if !ctx.filter.accepts(path) || !ctx.target.contains_path(path) {
        return skipped(SkipReason::NotCandidate);
    }

    // Pending -> Stable
    let file = match ctx.stability.wait(&ctx.target, path).await {
        Ok(file) => file,
        Err(e) if matches!(e.deref(), StabilityErrorKind::Unsettled(_)) => return skipped(SkipReason::Unstable),
        Err(e) if matches!(e.deref(), StabilityErrorKind::Vanished) => return skipped(SkipReason::Vanished),
        Err(e) => return Err(e).or_raise(|| ProcessErrorKind::Storage),
    };

    // Stable -> Classified
    let image = ctx.target.read(&file.path).await.or_raise(|| ProcessErrorKind::Storage)?;
    let description = ctx.classifier.classify(&image).await.or_raise(|| ProcessErrorKind::Classification)?;
    tracing::debug!(%description, "Classified");

    // Classified -> Renamed
    let slug = ctx.naming.slug(description.as_str());
    let date = file.created.to_offset(ctx.utc_offset).date();
    let extension = file.extension().ok_or_raise(|| ProcessErrorKind::Storage)?;
    if ctx.dry_run {
        let name = plan(ctx, date, &slug, &extension).await?;
        let to = ctx.target.join(&name).or_raise(|| ProcessErrorKind::Storage)?;
        return Ok(Action::Planned { from: file.path, to, description });
    }
    let to = rename_into_place(ctx, &file.path, date, &slug, &extension).await?;

    // Renamed -> Tagged
    let tagged = match ctx.comments.as_deref() {
        Some(comments) => tag(comments, &to, &description).await,
        None => false,
    };
    Ok(Action::Renamed { from: file.path, to, description, tagged })
}
