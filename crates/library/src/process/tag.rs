use shotname_classify::Description;
use shotname_storage::CommentWriter;
use std::path::Path;

/// Attaches the full description to the renamed file as a comment.
///
/// Best-effort: a failure is logged and reported as `false`, the new name
/// stays.
pub(crate) async fn tag(comments: &(dyn CommentWriter + Send + Sync), path: &Path, description: &Description) -> bool {
    match comments.set_comment(path, description.as_str()).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %*e, "Could not attach description; keeping the new name");
            false
        },
    }
}
