//! Command-line interface.

use clap::{ArgAction, Args, Parser, Subcommand};
use shotname_config::Config;
use std::ffi::OsString;
use std::path::PathBuf;

/// Renames screenshots after what they show.
#[derive(Debug, Parser)]
#[command(name = "shotname", version, about)]
pub struct Cli {
    /// Configuration file (defaults to the per-user config directory).
    #[arg(long, global = true, env = "SHOTNAME_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// More output; repeat for even more.
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,
    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rename every screenshot already in a folder, then exit.
    Process {
        folder: PathBuf,
        /// Classify and report the new names without renaming anything.
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        options: PipelineOptions,
    },
    /// Rename screenshots as they appear, until interrupted.
    Watch {
        folder: PathBuf,
        #[command(flatten)]
        options: PipelineOptions,
    },
    /// Launch a background watcher for a folder.
    Start {
        folder: PathBuf,
        #[command(flatten)]
        options: PipelineOptions,
    },
    /// Stop the background watcher for a folder.
    Stop { folder: PathBuf },
    /// Report whether a background watcher is running for a folder.
    Status { folder: PathBuf },
    /// Start the background watcher if it's stopped, stop it if it's running.
    Toggle {
        folder: PathBuf,
        #[command(flatten)]
        options: PipelineOptions,
    },
}

/// Per-run overrides on top of the loaded configuration.
#[derive(Debug, Default, Clone, Args)]
pub struct PipelineOptions {
    /// Vision model to describe screenshots with.
    #[arg(long)]
    pub model: Option<String>,
    /// Number of screenshots processed at once.
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Don't attach descriptions as file comments.
    #[arg(long)]
    pub no_comments: bool,
}

impl PipelineOptions {
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.classifier.model = model.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.watch.concurrency = concurrency;
        }
        if self.no_comments {
            config.comments = false;
        }
    }

    /// The same options as command-line arguments, for a child process.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(model) = &self.model {
            args.extend(["--model".into(), model.into()]);
        }
        if let Some(concurrency) = self.concurrency {
            args.extend(["--concurrency".into(), concurrency.to_string().into()]);
        }
        if self.no_comments {
            args.push("--no-comments".into());
        }
        args
    }
}

impl Cli {
    /// Log level requested on the command line, if any.
    pub fn level(&self) -> Option<&'static str> {
        match (self.quiet, self.verbose) {
            (true, _) => Some("warn"),
            (false, 0) => None,
            (false, 1) => Some("debug"),
            (false, _) => Some("trace"),
        }
    }

    /// Global flags to hand down to a child process.
    pub fn global_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(config) = &self.config {
            args.extend(["--config".into(), config.clone().into_os_string()]);
        }
        args.extend((0..self.verbose).map(|_| OsString::from("--verbose")));
        if self.quiet {
            args.push("--quiet".into());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_options() {
        let cli = Cli::try_parse_from([
            "shotname",
            "process",
            "/shots",
            "--dry-run",
            "--model",
            "gpt-4o",
            "--concurrency",
            "2",
            "-v",
        ])
        .unwrap();
        let Command::Process { folder, dry_run, options } = cli.command else { panic!("expected process") };
        assert_eq!(folder, PathBuf::from("/shots"));
        assert!(dry_run);
        assert_eq!(options.model.as_deref(), Some("gpt-4o"));
        assert_eq!(options.concurrency, Some(2));
        assert_eq!(cli.verbose, 1);
    }

    #[rstest]
    #[case(&["shotname", "status", "/shots"], None)]
    #[case(&["shotname", "-q", "status", "/shots"], Some("warn"))]
    #[case(&["shotname", "status", "/shots", "-v"], Some("debug"))]
    #[case(&["shotname", "-vvv", "status", "/shots"], Some("trace"))]
    fn test_level(#[case] args: &[&str], #[case] expected: Option<&str>) {
        assert_eq!(Cli::try_parse_from(args).unwrap().level(), expected);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["shotname", "-v", "-q", "status", "/shots"]).is_err());
    }

    #[test]
    fn test_folder_is_required() {
        assert!(Cli::try_parse_from(["shotname", "watch"]).is_err());
    }

    #[test]
    fn test_options_apply() {
        let mut config = Config::default();
        let options = PipelineOptions { model: Some("gpt-4o".into()), concurrency: Some(8), no_comments: true };
        options.apply(&mut config);
        assert_eq!(config.classifier.model, "gpt-4o");
        assert_eq!(config.watch.concurrency, 8);
        assert!(!config.comments);
    }

    #[test]
    fn test_options_round_trip_through_args() {
        let options = PipelineOptions { model: Some("gpt-4o".into()), concurrency: Some(8), no_comments: true };
        let mut args: Vec<OsString> = vec!["shotname".into(), "watch".into(), "/shots".into()];
        args.extend(options.to_args());
        let Command::Watch { options: parsed, .. } = Cli::try_parse_from(args).unwrap().command else {
            panic!("expected watch")
        };
        assert_eq!(parsed.model, options.model);
        assert_eq!(parsed.concurrency, options.concurrency);
        assert!(parsed.no_comments);
    }

    #[test]
    fn test_global_args_are_forwarded() {
        let cli = Cli::try_parse_from(["shotname", "--config", "/etc/shot.toml", "-vv", "start", "/shots"]).unwrap();
        assert_eq!(cli.global_args(), ["--config", "/etc/shot.toml", "--verbose", "--verbose"]);
    }
}
