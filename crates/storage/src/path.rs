//! File name validation.
//!
//! Everything the pipeline writes lands directly inside the watch target, so a
//! valid name is exactly one normal path component.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path};

/// Longest file name (in bytes) accepted by common filesystems.
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// Characters rejected by at least one mainstream filesystem.
const ILLEGAL: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Validates that `name` is a single, portable file name.
///
/// # Examples
///
/// ```
/// use shotname_storage::validate_file_name;
/// assert!(validate_file_name("2024-01-08_github-pr.png").is_ok());
/// assert!(validate_file_name("../escape.png").is_err());
/// assert!(validate_file_name("a/b.png").is_err());
/// assert!(validate_file_name("").is_err());
/// ```
pub fn validate_file_name(name: &str) -> Result<&str> {
    let invalid = || ErrorKind::InvalidPath(Path::new(name).to_path_buf());
    if name.is_empty() || name.len() > MAX_FILE_NAME_BYTES {
        exn::bail!(invalid());
    }
    // Null bytes pass through Path::components() on Unix but cause
    // truncation in C-based syscalls.
    if name.chars().any(|c| c == '\0' || c.is_control() || ILLEGAL.contains(&c)) {
        exn::bail!(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => exn::bail!(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("screenshot.png")]
    #[case("2024-01-08_github-pull-request-review-page.png")]
    #[case("2024-01-08_slack-dm-3.jpeg")]
    #[case("Screenshot 2024-01-08 at 10.12.00.png")]
    fn test_valid_names(#[case] name: &str) {
        assert_eq!(validate_file_name(name).unwrap(), name);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/b.png")]
    #[case("a\\b.png")]
    #[case("/absolute.png")]
    #[case("a\0b.png")]
    #[case("what?.png")]
    #[case("tab\there.png")]
    fn test_invalid_names(#[case] name: &str) {
        assert!(validate_file_name(name).is_err());
    }

    #[test]
    fn test_length_bound() {
        let long = format!("{}.png", "a".repeat(MAX_FILE_NAME_BYTES));
        assert!(validate_file_name(&long).is_err());
        let fits = format!("{}.png", "a".repeat(MAX_FILE_NAME_BYTES - 4));
        assert!(validate_file_name(&fits).is_ok());
    }
}
