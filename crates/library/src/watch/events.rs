//! Interpreting raw file system events.

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

/// Paths that newly appeared in the directory according to `event`.
///
/// A file showing up under a new name counts as created: screenshot tools
/// commonly write to a hidden temporary file and rename it into place. Some
/// backends (FSEvents) report renames without saying which side is which;
/// then the paths that currently exist are the new names.
pub(crate) fn appeared(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any | CreateKind::Other) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1).cloned().into_iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) => {
            event.paths.iter().filter(|p| p.exists()).cloned().collect()
        },
        _ => Vec::new(),
    }
}

/// Whether `event` says the watched directory itself went away.
pub(crate) fn root_lost(event: &Event, root: &Path) -> bool {
    let removed = match event.kind {
        EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::From | RenameMode::Any | RenameMode::Both)) => true,
        _ => false,
    };
    removed && event.paths.iter().any(|p| p == root) && !root.is_dir()
}
