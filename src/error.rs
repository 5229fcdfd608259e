//! Binary Error Types
//!
//! Everything the command-line front end can fail with. Library errors are
//! raised into one of these, so the top of every error tree says which step
//! of the command failed.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not initialize logging")]
    Logging,
    #[display("could not start the async runtime")]
    Runtime,
    #[display("could not load configuration")]
    Config,
    #[display("no API key configured; set OPENAI_API_KEY or classifier.api_key")]
    MissingApiKey,
    #[display("could not create the classifier")]
    Classifier,
    #[display("cannot use {} as a watch folder", _0.display())]
    Target(#[error(not(source))] PathBuf),
    #[display("batch processing stopped")]
    Batch,
    #[display("watching stopped")]
    Watch,
    /// Reading or writing a process marker failed.
    #[display("process marker {} is unusable", _0.display())]
    Marker(#[error(not(source))] PathBuf),
    /// No per-user directory to keep process markers in.
    #[display("no state directory available for process markers")]
    NoStateDir,
    #[display("a watcher is already running for this folder{}", _0.map(|pid| format!(" (pid {pid})")).unwrap_or_default())]
    AlreadyRunning(#[error(not(source))] Option<u32>),
    #[display("could not launch the watcher")]
    Spawn,
    /// The launched watcher exited before registering itself.
    #[display("the watcher exited during startup; see {}", _0.display())]
    ExitedEarly(#[error(not(source))] PathBuf),
    #[display("watcher (pid {_0}) did not stop in time")]
    StopTimeout(#[error(not(source))] u32),
}
