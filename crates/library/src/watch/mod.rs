//! Continuous mode: process screenshots as they appear.
//!
//! A [`notify`] watcher feeds raw events into a channel. Every path that
//! appears in the directory and passes the [`Candidates`](crate::Candidates)
//! filter is handed to its own pipeline task, at most
//! [`Context::concurrency`] running at once. A path already being processed
//! is not started a second time, so the burst of events a single screenshot
//! produces results in one pipeline.
//!
//! When `shutdown` resolves, the watcher is dropped so no new files are
//! accepted, and the pipelines already running are allowed to finish.

mod events;

use crate::error::{Error, ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::{Context, Tally, process_file};
use exn::{Exn, ResultExt};
use notify::{RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{Id, JoinError, JoinSet};

type Finished = Result<(Id, LibraryResult<crate::Action>), JoinError>;

/// Watches `ctx.target` until `shutdown` resolves or the watch fails.
///
/// Returns the tally of every file processed while watching.
///
/// # Errors
/// [`LibraryErrorKind::Watch`] if the watch can't be established, the
/// directory is removed, or the event source fails. Running pipelines are
/// still drained first.
pub async fn watch(ctx: Arc<Context>, shutdown: impl Future<Output = ()>) -> LibraryResult<Tally> {
    let root = ctx.target.root().to_path_buf();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        // Receiver gone means we're shutting down.
        _ = tx.send(event);
    })
    .or_raise(|| LibraryErrorKind::Watch)?;
    watcher.watch(&root, RecursiveMode::NonRecursive).or_raise(|| LibraryErrorKind::Watch)?;
    tracing::info!(path = %root.display(), concurrency = ctx.concurrency, "Watching for new screenshots");

    let permits = Arc::new(Semaphore::new(ctx.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut running: HashMap<Id, PathBuf> = HashMap::new();
    let mut in_flight: HashSet<PathBuf> = HashSet::new();
    let mut tally = Tally::default();
    let mut fatal: Option<Error> = None;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!(running = tasks.len(), "Shutting down; finishing files already in progress");
                break;
            },
            Some(finished) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                finish(finished, &mut running, &mut in_flight, &mut tally);
            },
            event = rx.recv() => match event {
                Some(Ok(event)) => {
                    if events::root_lost(&event, &root) {
                        fatal = Some(Exn::new(LibraryErrorKind::Watch));
                        tracing::error!(path = %root.display(), "Watched directory was removed");
                        break;
                    }
                    for path in events::appeared(&event) {
                        if !ctx.filter.accepts(&path) || !in_flight.insert(path.clone()) {
                            continue;
                        }
                        tracing::debug!(path = %path.display(), "New file");
                        let (ctx, permits, task_path) = (Arc::clone(&ctx), Arc::clone(&permits), path.clone());
                        let handle = tasks.spawn(async move {
                            // Never closed, so `None` can't happen; run anyway if it does.
                            let _permit = permits.acquire_owned().await.ok();
                            process_file(&ctx, &task_path).await
                        });
                        running.insert(handle.id(), path);
                    }
                },
                Some(Err(e)) => {
                    fatal = Some(Exn::new(e).raise(LibraryErrorKind::Watch));
                    break;
                },
                None => {
                    fatal = Some(Exn::new(LibraryErrorKind::Watch));
                    break;
                },
            },
        }
    }

    drop(watcher);
    while let Some(finished) = tasks.join_next_with_id().await {
        finish(finished, &mut running, &mut in_flight, &mut tally);
    }
    tracing::info!(
        renamed = tally.renamed,
        skipped = tally.skipped,
        failed = tally.failed,
        "Stopped watching"
    );
    match fatal {
        Some(e) => Err(e),
        None => Ok(tally),
    }
}

fn finish(
    finished: Finished,
    running: &mut HashMap<Id, PathBuf>,
    in_flight: &mut HashSet<PathBuf>,
    tally: &mut Tally,
) {
    let id = match &finished {
        Ok((id, _)) => *id,
        Err(e) => e.id(),
    };
    if let Some(path) = running.remove(&id) {
        in_flight.remove(&path);
    }
    match finished {
        Ok((_, result)) => tally.record(&result),
        Err(e) => {
            tally.failed += 1;
            tracing::error!(error = %e, "Pipeline task panicked");
        },
    }
}
