use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Crates whose log lines are ours. Everything else is held at `warn`.
const CRATES: [&str; 5] = ["shotname", "shotname_classify", "shotname_config", "shotname_library", "shotname_storage"];

fn directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|krate| format!("{krate}={level}")));
    directives.join(",")
}

/// Installs the global subscriber, writing to stderr.
///
/// An explicit `level` (from `-v`/`-q`) wins; otherwise `RUST_LOG` is used
/// if set, falling back to `info`.
pub fn init(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(directives(level)).or_raise(|| ErrorKind::Logging)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives("info"))),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .try_init()
        .or_raise(|| ErrorKind::Logging)
}
