//! Which files the pipeline picks up.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Names produced by the naming policy: a `YYYY-MM-DD_` date prefix.
static RENAMED: LazyLock<Regex> = LazyLock::new(|| {
    // Infallible: constant pattern.
    Regex::new(r"^\d{4}-\d{2}-\d{2}_").expect("valid renamed-file pattern")
});

/// Returns `true` if `name` already carries the date prefix this tool
/// writes, so the file must not be processed again.
pub fn is_renamed(name: &str) -> bool {
    RENAMED.is_match(name)
}

/// Accepts image files that haven't been renamed yet.
///
/// Rejected:
/// - extensions outside the allow-list (compared case-insensitively),
/// - hidden files (screenshot tools write to a dotfile and then rename it
///   into place),
/// - files already matching the naming pattern,
/// - names that aren't valid UTF-8.
#[derive(Debug, Clone)]
pub struct Candidates {
    extensions: Vec<String>,
}

impl Candidates {
    pub fn new(extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { extensions }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with('.') || is_renamed(name) {
            return false;
        }
        shotname_storage::extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }
}

impl Default for Candidates {
    fn default() -> Self {
        Self::new(["png", "jpg", "jpeg", "webp", "gif", "bmp"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/shots/Screenshot 2024-01-08.png", true)]
    #[case("/shots/Screenshot 2024-01-08 at 10.12.00.PNG", true)]
    #[case("/shots/photo.jpeg", true)]
    #[case("/shots/clip.mov", false)]
    #[case("/shots/notes.txt", false)]
    #[case("/shots/no-extension", false)]
    #[case("/shots/.Screenshot 2024-01-08.png", false)]
    #[case("/shots/2024-01-08_github-pull-request-review-page.png", false)]
    #[case("/shots/2024-01-08_github-pull-request-review-page-2.png", false)]
    fn test_accepts(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(Candidates::default().accepts(Path::new(path)), expected);
    }

    #[test]
    fn test_custom_extensions() {
        let filter = Candidates::new([".PNG"]);
        assert!(filter.accepts(Path::new("/shots/a.png")));
        assert!(!filter.accepts(Path::new("/shots/a.jpg")));
    }

    #[rstest]
    #[case("2024-01-08_a.png", true)]
    #[case("2024-01-08 a.png", false)]
    #[case("Screenshot 2024-01-08_a.png", false)]
    #[case("24-01-08_a.png", false)]
    fn test_is_renamed(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_renamed(name), expected);
    }
}
