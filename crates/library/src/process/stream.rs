use crate::Context;
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::process::file::{Action, process_file};
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};

/// Progress events emitted by [`process_directory`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete): exactly once, with the
///    number of candidate files.
/// 3. [`Processed`](Self::Processed): zero or more times, one per file.
/// 4. [`Complete`](Self::Complete): exactly once, signalling the stream is
///    finished.
///
/// A listing error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum BatchEvent {
    /// Processing has begun; emitted exactly once before any other event.
    Started,
    /// The directory has been listed; the number of candidates is now known.
    DiscoveryComplete(u64),
    /// A file has been processed.
    Processed(Action),
    /// Every candidate has been processed; the stream is finished.
    Complete,
}

/// Streams [`BatchEvent`]s for every candidate file already present in the
/// watch target.
///
/// Files are processed concurrently, up to the context's concurrency limit at
/// a time, promoting the next file as each one finishes. One file failing
/// yields an `Err` item and processing carries on with the rest; only a
/// listing failure ends the stream.
pub fn process_directory(ctx: &Context) -> impl Stream<Item = LibraryResult<BatchEvent>> + '_ {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(BatchEvent::Started);

        let files = match ctx.target.list().await.or_raise(|| LibraryErrorKind::Scan) {
            Ok(files) => files,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        let candidates: Vec<_> = files.into_iter().filter(|f| ctx.filter.accepts(&f.path)).map(|f| f.path).collect();
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        yield Ok(BatchEvent::DiscoveryComplete(u64::try_from(candidates.len()).unwrap_or(0)));

        let mut futures: Vec<_> = candidates.iter().map(|path| process_file(ctx, path)).collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(futures.drain(..ctx.concurrency.max(1).min(futures.len())));
        while let Some(result) = processing.next().await {
            yield result.map(BatchEvent::Processed);
            // Pop-n-push, but FIFO instead of LIFO.
            if !futures.is_empty() {
                processing.push(futures.remove(0));
            }
        }

        yield Ok(BatchEvent::Complete);
    })
}
