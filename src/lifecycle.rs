//! Background watcher management.
//!
//! A running watcher is recorded in a [`ProcessMarker`]: a small file holding
//! its pid and process start time, one per watch folder, guarded by an
//! exclusive file lock the watcher holds until it exits. The marker is
//! claimed by the `watch` command itself, so a watcher started by hand is
//! protected the same way as one launched with `start`. A marker nobody
//! holds the lock for is stale and is removed whenever it is encountered.

use crate::cli::{Cli, PipelineOptions};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use fs2::FileExt;
use shotname_config::APPLICATION;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};

/// How long `start` waits for the new watcher to register itself.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
/// How long `stop` waits for in-flight files to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(120);
const POLL: Duration = Duration::from_millis(100);

/// Identity of a watcher process. The start time guards against the pid
/// having been reused since the marker was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerRecord {
    pub pid: u32,
    pub started: u64,
}

impl fmt::Display for MarkerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pid, self.started)
    }
}

impl FromStr for MarkerRecord {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let pid = parts.next().and_then(|p| p.parse().ok()).ok_or(())?;
        let started = parts.next().and_then(|p| p.parse().ok()).ok_or(())?;
        match parts.next() {
            None => Ok(Self { pid, started }),
            Some(_) => Err(()),
        }
    }
}

/// Process table queries, backed by `sysinfo`.
pub struct Processes {
    system: System,
}

impl Processes {
    pub fn new() -> Self {
        Self { system: System::new() }
    }

    /// The identity of a running process, or `None` if there's no such
    /// process.
    pub fn record(&mut self, pid: u32) -> Option<MarkerRecord> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        let process = self.system.process(pid)?;
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return None;
        }
        Some(MarkerRecord { pid: pid.as_u32(), started: process.start_time() })
    }

    /// This process.
    pub fn current(&mut self) -> Option<MarkerRecord> {
        self.record(std::process::id())
    }

    pub fn is_alive(&mut self, record: &MarkerRecord) -> bool {
        self.record(record.pid).is_some_and(|current| current.started == record.started)
    }

    /// Asks the process to shut down gracefully. Returns `false` if it
    /// couldn't be signalled.
    pub fn terminate(&mut self, record: &MarkerRecord) -> bool {
        if !self.is_alive(record) {
            return false;
        }
        self.system
            .process(Pid::from_u32(record.pid))
            .and_then(|process| process.kill_with(Signal::Term))
            .unwrap_or(false)
    }
}

/// What a folder's lock says about its watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watcher {
    Stopped,
    /// The lock is held. The record is `None` until the watcher has written it.
    Running(Option<MarkerRecord>),
}

/// The persisted "watcher is running" record for one watch folder.
///
/// A watcher holds an exclusive lock on a sibling `.lock` file for as long
/// as it runs; the lock, not the pid, decides whether a watcher is alive.
/// The operating system drops the lock when the process exits, however it
/// exits. The lock file itself is never removed.
#[derive(Debug, Clone)]
pub struct ProcessMarker {
    path: PathBuf,
}

/// Held by the running watcher. Dropping it releases the folder without
/// removing the marker; use [`MarkerGuard::release`].
#[derive(Debug)]
pub struct MarkerGuard {
    marker: ProcessMarker,
    me: MarkerRecord,
    _lock: File,
}

impl MarkerGuard {
    /// Removes the marker if it still names this watcher, then unlocks.
    pub fn release(self) -> Result<()> {
        match self.marker.read()? {
            Some(record) if record == self.me => self.marker.clear(),
            _ => Ok(()),
        }
    }
}

impl ProcessMarker {
    /// The marker for `folder`, in the per-user runtime or state directory.
    pub fn for_folder(folder: &Path) -> Result<Self> {
        let dirs = ProjectDirs::from("", "", APPLICATION).ok_or_raise(|| ErrorKind::NoStateDir)?;
        let dir = dirs.runtime_dir().or(dirs.state_dir()).unwrap_or(dirs.data_local_dir());
        Ok(Self::in_dir(dir, folder))
    }

    /// The marker for `folder`, stored in `dir`. Markers are named after a
    /// hash of the canonical folder path.
    pub fn in_dir(dir: &Path, folder: &Path) -> Self {
        let folder = canonical(folder);
        let hash = blake3::hash(folder.as_os_str().as_encoded_bytes()).to_hex();
        Self { path: dir.join(format!("watcher-{}.pid", &hash[..16])) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a watcher launched with `start` writes its output.
    pub fn log_path(&self) -> PathBuf {
        self.path.with_extension("log")
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// The recorded watcher, whether or not it's still alive. Unreadable
    /// contents count as no marker.
    pub fn read(&self) -> Result<Option<MarkerRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.parse().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).or_raise(|| ErrorKind::Marker(self.path.clone())),
        }
    }

    /// Opens the lock file and tries to take it. `None` means another
    /// process holds it.
    fn try_lock(&self) -> Result<Option<File>> {
        let path = self.lock_path();
        let error = || ErrorKind::Marker(path.clone());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).or_raise(error)?;
        }
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path).or_raise(error)?;
        // Fully qualified: std's `File::try_lock` has a different error type.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(file)),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e).or_raise(error),
        }
    }

    /// Whether a watcher holds this folder. A marker left behind by a
    /// watcher that is gone is removed, while holding the lock.
    pub fn live(&self) -> Result<Watcher> {
        let Some(_lock) = self.try_lock()? else {
            return Ok(Watcher::Running(self.read()?));
        };
        if self.path.exists() {
            let stale = self.read()?;
            tracing::info!(marker = %self.path.display(), pid = stale.map(|r| r.pid), "Removing stale process marker");
            self.clear()?;
        }
        Ok(Watcher::Stopped)
    }

    /// Takes the folder for `me` and records it in the marker.
    ///
    /// # Errors
    /// [`ErrorKind::AlreadyRunning`] if another watcher holds the folder.
    pub fn claim(&self, me: MarkerRecord) -> Result<MarkerGuard> {
        let error = || ErrorKind::Marker(self.path.clone());
        let Some(lock) = self.try_lock()? else {
            let other = self.read()?;
            exn::bail!(ErrorKind::AlreadyRunning(other.map(|r| r.pid)));
        };
        // Written in full, then moved over any stale marker, so readers never
        // see a partial record.
        let staging = self.path.with_extension(format!("pid.{}", me.pid));
        fs::write(&staging, me.to_string()).or_raise(error)?;
        if let Err(e) = fs::rename(&staging, &self.path) {
            _ = fs::remove_file(&staging);
            return Err(e).or_raise(error);
        }
        Ok(MarkerGuard { marker: self.clone(), me, _lock: lock })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).or_raise(|| ErrorKind::Marker(self.path.clone())),
        }
    }
}

fn canonical(folder: &Path) -> PathBuf {
    fs::canonicalize(folder).unwrap_or_else(|_| std::path::absolute(folder).unwrap_or_else(|_| folder.to_path_buf()))
}

/// Launches a detached `watch` process for `folder` and waits until it has
/// claimed the marker.
pub fn start(cli: &Cli, folder: &Path, options: &PipelineOptions) -> Result<ExitCode> {
    let folder = fs::canonicalize(folder).or_raise(|| ErrorKind::Target(folder.to_path_buf()))?;
    let marker = ProcessMarker::for_folder(&folder)?;
    if let Watcher::Running(running) = marker.live()? {
        exn::bail!(ErrorKind::AlreadyRunning(running.map(|r| r.pid)));
    }

    let log_path = marker.log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).or_raise(|| ErrorKind::Marker(log_path.clone()))?;
    }
    let log = OpenOptions::new().create(true).append(true).open(&log_path).or_raise(|| ErrorKind::Spawn)?;
    let log_err = log.try_clone().or_raise(|| ErrorKind::Spawn)?;
    let exe = std::env::current_exe().or_raise(|| ErrorKind::Spawn)?;

    let mut command = Command::new(exe);
    command
        .args(cli.global_args())
        .arg("watch")
        .arg(&folder)
        .args(options.to_args())
        .stdin(Stdio::null())
        .stdout(log)
        .stderr(log_err);
    // Own process group: a Ctrl-C in the launching terminal must not reach it.
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut command, 0);
    let mut child = command.spawn().or_raise(|| ErrorKind::Spawn)?;
    let pid = child.id();

    let deadline = Instant::now() + STARTUP_TIMEOUT;
    while Instant::now() < deadline {
        if child.try_wait().or_raise(|| ErrorKind::Spawn)?.is_some() {
            exn::bail!(ErrorKind::ExitedEarly(log_path));
        }
        if marker.read()?.is_some_and(|record| record.pid == pid) {
            tracing::info!(pid, folder = %folder.display(), log = %log_path.display(), "Watcher started");
            return Ok(ExitCode::SUCCESS);
        }
        std::thread::sleep(POLL);
    }
    // Running but never registered. Don't leave it behind unmanaged.
    _ = child.kill();
    _ = child.wait();
    exn::bail!(ErrorKind::ExitedEarly(log_path));
}

/// Signals the folder's watcher to stop and waits for it to exit.
pub fn stop(folder: &Path) -> Result<ExitCode> {
    let marker = ProcessMarker::for_folder(folder)?;
    let running = match marker.live()? {
        Watcher::Stopped => {
            tracing::info!(folder = %folder.display(), "No watcher running");
            return Ok(ExitCode::SUCCESS);
        },
        // Still starting up; its pid isn't known yet.
        Watcher::Running(None) => exn::bail!(ErrorKind::Marker(marker.path().to_path_buf())),
        Watcher::Running(Some(running)) => running,
    };
    if !Processes::new().terminate(&running) {
        // Exited between the check and the signal; this clears its marker.
        marker.live()?;
        return Ok(ExitCode::SUCCESS);
    }
    tracing::info!(pid = running.pid, "Waiting for watcher to finish files in progress");
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while marker.live()? != Watcher::Stopped {
        if Instant::now() >= deadline {
            exn::bail!(ErrorKind::StopTimeout(running.pid));
        }
        std::thread::sleep(POLL);
    }
    tracing::info!(pid = running.pid, "Watcher stopped");
    Ok(ExitCode::SUCCESS)
}

/// Prints whether the folder's watcher is running. Exits with 3 when it
/// isn't, as LSB `status` does.
pub fn status(folder: &Path) -> Result<ExitCode> {
    let marker = ProcessMarker::for_folder(folder)?;
    match marker.live()? {
        Watcher::Running(Some(running)) => {
            println!("running (pid {})", running.pid);
            Ok(ExitCode::SUCCESS)
        },
        Watcher::Running(None) => {
            println!("starting");
            Ok(ExitCode::SUCCESS)
        },
        Watcher::Stopped => {
            println!("not running");
            Ok(ExitCode::from(3))
        },
    }
}

pub fn toggle(cli: &Cli, folder: &Path, options: &PipelineOptions) -> Result<ExitCode> {
    let marker = ProcessMarker::for_folder(folder)?;
    match marker.live()? {
        Watcher::Running(_) => stop(folder),
        Watcher::Stopped => start(cli, folder, options),
    }
}
