mod cli;
mod error;
mod lifecycle;
mod logging;
mod run;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use std::process::ExitCode;
use time::UtcOffset;

fn main() -> ExitCode {
    // The local offset can only be determined soundly while the process is
    // single-threaded, so before the runtime starts.
    let utc_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.level()) {
        eprintln!("{e:?}");
        return ExitCode::FAILURE;
    }
    match dispatch(&cli, utc_offset) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "{}", *e);
            ExitCode::FAILURE
        },
    }
}

fn dispatch(cli: &Cli, utc_offset: UtcOffset) -> Result<ExitCode> {
    match &cli.command {
        Command::Process { folder, dry_run, options } => {
            let config = run::load_config(cli.config.as_deref(), options)?;
            runtime()?.block_on(run::process(&config, folder, utc_offset, *dry_run))
        },
        Command::Watch { folder, options } => {
            let config = run::load_config(cli.config.as_deref(), options)?;
            runtime()?.block_on(run::watch(&config, folder, utc_offset))
        },
        Command::Start { folder, options } => {
            // Fail here rather than in the detached child.
            run::preflight(&run::load_config(cli.config.as_deref(), options)?)?;
            lifecycle::start(cli, folder, options)
        },
        Command::Stop { folder } => lifecycle::stop(folder),
        Command::Status { folder } => lifecycle::status(folder),
        Command::Toggle { folder, options } => {
            run::preflight(&run::load_config(cli.config.as_deref(), options)?)?;
            lifecycle::toggle(cli, folder, options)
        },
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().or_raise(|| ErrorKind::Runtime)
}
