//! The watched directory.
//!
//! A [`WatchTarget`] is a canonicalized, readable directory. All reads and
//! writes the pipeline performs go through it, and it owns the lock that
//! serializes "decide on a name + move the file" within the directory.

use crate::error::{ErrorKind, Result};
use crate::file::FileInfo;
use crate::path::validate_file_name;
use async_stream::stream;
use futures::{Stream, TryStreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::sync::Mutex;

type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// A directory being watched for new screenshots.
///
/// # Examples
///
/// ```no_run
/// use shotname_storage::WatchTarget;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let target = WatchTarget::open("/home/me/Pictures/Screenshots")?;
/// println!("watching {}", target.root().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WatchTarget {
    /// Canonical path of the directory
    root: PathBuf,
    /// Held while a name is being claimed. Two pipelines must never both
    /// decide that the same name is free.
    rename_lock: Mutex<()>,
}
impl WatchTarget {
    /// Opens an existing directory. Never creates it.
    ///
    /// # Errors
    /// Returns [`ErrorKind::NotADirectory`] if the path is missing, isn't a
    /// directory, or can't be listed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let requested = root.as_ref();
        let not_a_directory = || ErrorKind::NotADirectory(requested.to_path_buf());
        // Use non-async here; it'll only happen once on startup and it's not
        // worth the hassle of making the constructor async.
        let root = std::fs::canonicalize(requested).map_err(|_| not_a_directory())?;
        if !root.is_dir() {
            exn::bail!(not_a_directory());
        }
        // Readability check: listing is the first thing both modes do.
        std::fs::read_dir(&root).map_err(|_| not_a_directory())?;
        Ok(Self { root, rename_lock: Mutex::new(()) })
    }

    /// Canonical path of the watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path that `name` would have inside the target.
    pub fn join(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_file_name(name)?))
    }

    /// Whether `path` is a direct child of the watch target.
    pub fn contains_path(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
    }

    /// Streams every regular file directly inside the target (no recursion).
    ///
    /// Entries that vanish between listing and stat are silently dropped, as
    /// are directories and broken symlinks.
    pub fn list_stream(&self) -> FileInfoStream<'_> {
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(e) => {
                    yield Err(exn::Exn::from(ErrorKind::from_io(e, &self.root)));
                    return;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => { yield Err(exn::Exn::from(ErrorKind::from_io(e, &self.root))); continue; },
                };
                let path = entry.path();
                match fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_file() => yield Ok(FileInfo::from_metadata(&path, &metadata)),
                    Ok(_) => {},
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                    Err(e) => yield Err(exn::Exn::from(ErrorKind::from_io(e, &path))),
                }
            }
        })
    }

    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    pub async fn list(&self) -> Result<Vec<FileInfo>> {
        self.list_stream().try_collect().await
    }

    /// Check if a file called `name` exists in the target.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.join(name)?;
        Ok(fs::try_exists(&path).await.map_err(|e| ErrorKind::from_io(e, &path))?)
    }

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if the file does not exist.
    pub async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.ensure_inside(path)?;
        let metadata = fs::metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        }
        Ok(FileInfo::from_metadata(path, &metadata))
    }

    /// Read file contents.
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.ensure_inside(path)?;
        Ok(fs::read(path).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    /// Moves `from` to `name` inside the target, failing instead of
    /// overwriting.
    ///
    /// The destination is claimed with a hard link, which the kernel refuses
    /// atomically if the name is taken, and the original is only unlinked
    /// once the destination is confirmed to exist. On filesystems without
    /// hard links, existence is re-checked and a plain rename performed while
    /// the directory's rename lock is held.
    ///
    /// # Errors
    /// - [`AlreadyExists`](ErrorKind::AlreadyExists) if `name` is taken; the
    ///   source is untouched.
    /// - [`CrossDevice`](ErrorKind::CrossDevice) if `from` lives on another
    ///   volume.
    /// - [`InvalidPath`](ErrorKind::InvalidPath) if `from` is outside the
    ///   target or `name` isn't a single valid file name.
    pub async fn rename_no_clobber(&self, from: &Path, name: &str) -> Result<PathBuf> {
        self.ensure_inside(from)?;
        let to = self.join(name)?;
        let _guard = self.rename_lock.lock().await;
        self.ensure_same_volume(from).await?;

        match fs::hard_link(from, &to).await {
            Ok(()) => {},
            Err(e) if links_unsupported(&e) => {
                tracing::trace!(error = %e, "Hard link refused; falling back to checked rename");
                return self.rename_checked(from, &to).await;
            },
            Err(e) => exn::bail!(ErrorKind::from_io(e, &to)),
        }
        // The destination must exist before the original is touched.
        if let Err(e) = fs::metadata(&to).await {
            exn::bail!(ErrorKind::from_io(e, &to));
        }
        if let Err(e) = fs::remove_file(from).await {
            // Both names point at the same data; dropping the new link
            // restores the original state without losing anything.
            _ = fs::remove_file(&to).await;
            exn::bail!(ErrorKind::from_io(e, from));
        }
        tracing::debug!(from = %from.display(), to = %to.display(), "Moved file into place");
        Ok(to)
    }

    /// Fallback for filesystems without hard links. Only sound because the
    /// caller holds the rename lock.
    async fn rename_checked(&self, from: &Path, to: &Path) -> Result<PathBuf> {
        if fs::try_exists(to).await.map_err(|e| ErrorKind::from_io(e, to))? {
            exn::bail!(ErrorKind::AlreadyExists(to.to_path_buf()));
        }
        fs::rename(from, to).await.map_err(|e| ErrorKind::from_io(e, to))?;
        tracing::debug!(from = %from.display(), to = %to.display(), "Renamed file into place (no hard link support)");
        Ok(to.to_path_buf())
    }

    fn ensure_inside(&self, path: &Path) -> Result<()> {
        match self.contains_path(path) {
            true => Ok(()),
            false => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        }
    }

    #[cfg(unix)]
    async fn ensure_same_volume(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::MetadataExt;
        let source = fs::symlink_metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        let root = fs::metadata(&self.root).await.map_err(|e| ErrorKind::from_io(e, &self.root))?;
        match source.dev() == root.dev() {
            true => Ok(()),
            false => exn::bail!(ErrorKind::CrossDevice(path.to_path_buf())),
        }
    }

    #[cfg(not(unix))]
    async fn ensure_same_volume(&self, path: &Path) -> Result<()> {
        // Hard linking across volumes fails with `CrossesDevices`, which
        // maps to the same error.
        fs::symlink_metadata(path).await.map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(())
    }
}

/// Whether a failed `link(2)` means the filesystem can't hard link at all.
///
/// vfat, exFAT and several FUSE/SMB mounts answer `EPERM` rather than
/// `EOPNOTSUPP`. A genuine permission problem fails the rename as well.
fn links_unsupported(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::Unsupported | std::io::ErrorKind::PermissionDenied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn target() -> (tempfile::TempDir, WatchTarget) {
        let dir = tempfile::tempdir().unwrap();
        let target = WatchTarget::open(dir.path()).unwrap();
        (dir, target)
    }

    #[test]
    fn test_open_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WatchTarget::open(dir.path()).is_ok());
        let missing = WatchTarget::open(dir.path().join("missing")).unwrap_err();
        assert!(matches!(&*missing, ErrorKind::NotADirectory(_)));
        // Never created implicitly.
        assert!(!dir.path().join("missing").exists());
        std::fs::write(dir.path().join("file.png"), b"data").unwrap();
        assert!(WatchTarget::open(dir.path().join("file.png")).is_err());
    }

    #[tokio::test]
    async fn test_list_skips_directories() {
        let (dir, target) = target();
        std::fs::write(dir.path().join("a.png"), b"data").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"data").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.png"), b"data").unwrap();
        let mut names: Vec<_> = target.list().await.unwrap().iter().map(|f| f.file_name().unwrap().to_string()).collect();
        names.sort();
        assert_eq!(names, ["a.png", "b.txt"]);
    }

    #[tokio::test]
    async fn test_stat_and_read() {
        let (_dir, target) = target();
        let path = target.join("shot.png").unwrap();
        std::fs::write(&path, b"0123456789").unwrap();
        let info = target.stat(&path).await.unwrap();
        assert_eq!(info.size, 10);
        assert_eq!(target.read(&path).await.unwrap(), b"0123456789");
        let err = target.stat(&target.join("missing.png").unwrap()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_paths_outside_target_are_rejected() {
        let (_dir, target) = target();
        let outside = tempfile::tempdir().unwrap();
        let path = outside.path().join("shot.png");
        std::fs::write(&path, b"data").unwrap();
        assert!(target.read(&path).await.is_err());
        let err = target.rename_no_clobber(&path, "new.png").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_rename_moves_file() {
        let (_dir, target) = target();
        let from = target.join("Screenshot 2024-01-08.png").unwrap();
        std::fs::write(&from, b"pixels").unwrap();
        let to = target.rename_no_clobber(&from, "2024-01-08_shot.png").await.unwrap();
        assert_eq!(to, target.root().join("2024-01-08_shot.png"));
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"pixels");
    }

    #[tokio::test]
    async fn test_rename_never_overwrites() {
        let (_dir, target) = target();
        let from = target.join("incoming.png").unwrap();
        let existing = target.join("taken.png").unwrap();
        std::fs::write(&from, b"incoming").unwrap();
        std::fs::write(&existing, b"existing").unwrap();
        let err = target.rename_no_clobber(&from, "taken.png").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(std::fs::read(&from).unwrap(), b"incoming");
        assert_eq!(std::fs::read(&existing).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn test_rename_rejects_invalid_names() {
        let (_dir, target) = target();
        let from = target.join("incoming.png").unwrap();
        std::fs::write(&from, b"incoming").unwrap();
        assert!(target.rename_no_clobber(&from, "../escape.png").await.is_err());
        assert!(target.rename_no_clobber(&from, "a/b.png").await.is_err());
        assert!(from.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renames_to_same_name() {
        let (_dir, target) = target();
        let target = Arc::new(target);
        let mut handles = Vec::new();
        for i in 0..8 {
            let from = target.join(&format!("shot-{i}.png")).unwrap();
            std::fs::write(&from, format!("content {i}")).unwrap();
            let target = Arc::clone(&target);
            handles.push(tokio::spawn(async move { target.rename_no_clobber(&from, "same.png").await }));
        }
        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(e) => assert!(matches!(&*e, ErrorKind::AlreadyExists(_))),
            }
        }
        assert_eq!(won, 1);
        // Nothing lost: one moved, seven still at their original names.
        assert_eq!(target.list().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_exists() {
        let (_dir, target) = target();
        assert!(!target.exists("a.png").await.unwrap());
        std::fs::write(target.join("a.png").unwrap(), b"data").unwrap();
        assert!(target.exists("a.png").await.unwrap());
        assert!(target.exists("../a.png").await.is_err());
    }

    #[rstest::rstest]
    #[case::unsupported(std::io::ErrorKind::Unsupported, true)]
    #[case::eperm(std::io::ErrorKind::PermissionDenied, true)]
    #[case::taken(std::io::ErrorKind::AlreadyExists, false)]
    #[case::cross_device(std::io::ErrorKind::CrossesDevices, false)]
    #[case::missing(std::io::ErrorKind::NotFound, false)]
    fn test_links_unsupported(#[case] kind: std::io::ErrorKind, #[case] expected: bool) {
        assert_eq!(links_unsupported(&std::io::Error::from(kind)), expected);
    }

    #[tokio::test]
    async fn test_checked_rename_without_hard_links() {
        let (_dir, target) = target();
        let from = target.join("incoming.png").unwrap();
        let existing = target.join("taken.png").unwrap();
        std::fs::write(&from, b"incoming").unwrap();
        std::fs::write(&existing, b"existing").unwrap();

        let err = target.rename_checked(&from, &existing).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(std::fs::read(&from).unwrap(), b"incoming");
        assert_eq!(std::fs::read(&existing).unwrap(), b"existing");

        let to = target.join("free.png").unwrap();
        assert_eq!(target.rename_checked(&from, &to).await.unwrap(), to);
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"incoming");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_other_volume_is_refused() {
        let (_dir, target) = target();
        let local = target.join("shot.png").unwrap();
        std::fs::write(&local, b"data").unwrap();
        assert!(target.ensure_same_volume(&local).await.is_ok());

        // procfs is always its own filesystem.
        let err = target.ensure_same_volume(Path::new("/proc/self/status")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CrossDevice(_)));
    }
}
