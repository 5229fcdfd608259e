//! The per-file pipeline.
//!
//! Every candidate file moves through the same states:
//!
//! ```text
//! Pending -> Stable -> Classified -> Renamed -> Tagged
//!    |          |           |            |
//!    +----------+-----------+------------+--> Skipped / Failed
//! ```
//!
//! A file only ever ends up with its original name (skipped, failed) or one
//! synthesized name (renamed). Tagging is best-effort and never undoes the
//! rename.
//!
//! [`process_file`] runs one file. [`process_directory`] runs every
//! candidate already in the watch target, as a stream of [`BatchEvent`]s.

pub mod error;
mod file;
mod rename;
mod stream;
mod tag;

pub use self::file::{Action, SkipReason, process_file};
pub use self::stream::{BatchEvent, process_directory};
