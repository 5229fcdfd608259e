//! Searchable file comments.
//!
//! A [`CommentWriter`] attaches free text to a file as filesystem metadata.
//! The [`XattrComments`] implementation shells out to the platform's extended
//! attribute tool:
//!
//! - **macOS**: the Finder comment (`com.apple.metadata:kMDItemFinderComment`),
//!   stored as a binary plist via `xattr -x -w`. Spotlight indexes it.
//! - **Other unix**: `user.xdg.comment` via `setfattr`, as read by most
//!   freedesktop file managers.
//!
//! Callers are expected to treat every error from this module as ignorable.

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use self::mock::MockComments;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;

pub type CommentHandle = Arc<dyn CommentWriter + Send + Sync>;

/// Attaches a comment-style metadata attribute to a file.
#[async_trait]
pub trait CommentWriter: Send + Sync {
    /// Replaces any existing comment on `path` with `text`.
    async fn set_comment(&self, path: &Path, text: &str) -> Result<()>;
}

/// Writes comments with the platform's extended-attribute command-line tool.
#[derive(Debug, Clone, Default)]
pub struct XattrComments;

impl XattrComments {
    #[cfg(target_os = "macos")]
    fn command(path: &Path, text: &str) -> Result<Command> {
        let mut value = Vec::new();
        plist::Value::String(text.to_string())
            .to_writer_binary(&mut value)
            .map_err(|e| ErrorKind::Comment(format!("could not encode comment: {e}")))?;
        let mut cmd = Command::new("xattr");
        cmd.arg("-x").arg("-w").arg("com.apple.metadata:kMDItemFinderComment").arg(hex::encode(value)).arg(path);
        Ok(cmd)
    }

    #[cfg(not(target_os = "macos"))]
    fn command(path: &Path, text: &str) -> Result<Command> {
        let mut cmd = Command::new("setfattr");
        // Hex-encoded so that values starting with `0x`/`0s` or containing
        // quotes aren't reinterpreted by setfattr.
        cmd.arg("-n").arg("user.xdg.comment").arg("-v").arg(format!("0x{}", hex::encode(text))).arg(path);
        Ok(cmd)
    }
}

#[async_trait]
impl CommentWriter for XattrComments {
    async fn set_comment(&self, path: &Path, text: &str) -> Result<()> {
        let output = Self::command(path, text)?
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| ErrorKind::Comment(format!("could not run extended attribute tool: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            exn::bail!(ErrorKind::Comment(format!("{} ({})", stderr.trim(), output.status)));
        }
        tracing::debug!(path = %path.display(), bytes = text.len(), "Comment written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_setfattr_command_hex_encodes_value() {
        let cmd = XattrComments::command(Path::new("/shots/a.png"), "0x hi").unwrap();
        let args: Vec<_> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-n", "user.xdg.comment", "-v", "0x3078206869", "/shots/a.png"]);
        assert_eq!(cmd.as_std().get_program(), "setfattr");
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_xattr_command_writes_plist() {
        let cmd = XattrComments::command(Path::new("/shots/a.png"), "hi").unwrap();
        let args: Vec<_> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[2], "com.apple.metadata:kMDItemFinderComment");
        assert!(args[3].starts_with("62706c6973743030"));
    }
}
