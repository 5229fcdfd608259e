//! The `process` and `watch` commands.

use crate::cli::PipelineOptions;
use crate::error::{ErrorKind, Result};
use crate::lifecycle::{ProcessMarker, Processes};
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use shotname_classify::{ClassifierHandle, OpenAiClassifier, Retrying};
use shotname_config::{ClassifierConfig, Config};
use shotname_library::{BatchEvent, Candidates, Context, NamingPolicy, StabilityGate, Tally};
use shotname_storage::WatchTarget;
use shotname_storage::comment::XattrComments;
use std::path::Path;
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;
use time::UtcOffset;

/// Loads configuration and layers the command-line overrides on top.
pub fn load_config(path: Option<&Path>, options: &PipelineOptions) -> Result<Config> {
    let mut config = Config::load(path).or_raise(|| ErrorKind::Config)?;
    options.apply(&mut config);
    config.validate().or_raise(|| ErrorKind::Config)?;
    Ok(config)
}

/// Checks that a watcher could be built from `config`, without touching any
/// folder.
pub fn preflight(config: &Config) -> Result<()> {
    classifier(&config.classifier).map(|_| ())
}

fn classifier(config: &ClassifierConfig) -> Result<ClassifierHandle> {
    let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty()).ok_or_raise(|| ErrorKind::MissingApiKey)?;
    let client = OpenAiClassifier::with_timeout(api_key, config.timeout())
        .or_raise(|| ErrorKind::Classifier)?
        .with_endpoint(&config.endpoint)
        .with_model(&config.model)
        .with_max_tokens(config.max_tokens)
        .with_max_dimension(config.max_image_dimension);
    tracing::debug!(model = client.model(), endpoint = %config.endpoint, retries = config.retries, "Classifier configured");
    let client: ClassifierHandle = Arc::new(client);
    Ok(match config.retries {
        0 => client,
        retries => Arc::new(Retrying::new(client, retries, config.retry_backoff())),
    })
}

/// Everything but the classifier, which tests substitute.
pub fn context(
    config: &Config,
    folder: &Path,
    classifier: ClassifierHandle,
    utc_offset: UtcOffset,
    dry_run: bool,
) -> Result<Context> {
    let target = WatchTarget::open(folder).or_raise(|| ErrorKind::Target(folder.to_path_buf()))?;
    let ctx = Context::new(target, classifier)
        .with_filter(Candidates::new(&config.watch.extensions))
        .with_naming(NamingPolicy::new(
            config.naming.max_slug_length,
            config.naming.max_attempts,
            config.naming.fallback.clone(),
        ))
        .with_stability(StabilityGate::new(config.stability.settle(), config.stability.max_checks))
        .with_max_collision_retries(config.rename.max_collision_retries)
        .with_concurrency(config.watch.concurrency)
        .with_utc_offset(utc_offset)
        .with_dry_run(dry_run);
    Ok(match config.comments {
        true => ctx.with_comments(Arc::new(XattrComments)),
        false => ctx,
    })
}

/// One pass over the screenshots already in `folder`.
///
/// Per-file failures are logged and counted but don't change the exit code;
/// only failing to read the folder does.
pub async fn process(config: &Config, folder: &Path, utc_offset: UtcOffset, dry_run: bool) -> Result<ExitCode> {
    let ctx = context(config, folder, classifier(&config.classifier)?, utc_offset, dry_run)?;
    let tally = batch(&ctx).await?;
    tracing::info!(
        renamed = tally.renamed,
        planned = tally.planned,
        skipped = tally.skipped,
        failed = tally.failed,
        "Done"
    );
    Ok(ExitCode::SUCCESS)
}

pub(crate) async fn batch(ctx: &Context) -> Result<Tally> {
    let mut tally = Tally::default();
    let mut events = pin!(shotname_library::process_directory(ctx));
    while let Some(event) = events.next().await {
        match event {
            Ok(BatchEvent::Started) => tracing::debug!(folder = %ctx.target.root().display(), "Scanning"),
            Ok(BatchEvent::DiscoveryComplete(count)) => tracing::info!(count, "Found screenshots to process"),
            Ok(BatchEvent::Processed(action)) => tally.record(&Ok(action)),
            Ok(BatchEvent::Complete) => {},
            Err(e) if e.is_fatal() => return Err(e).or_raise(|| ErrorKind::Batch),
            Err(e) => tally.record(&Err(e)),
        }
    }
    Ok(tally)
}

/// Watches `folder` until SIGINT/SIGTERM, holding the folder's process marker
/// for the whole time.
pub async fn watch(config: &Config, folder: &Path, utc_offset: UtcOffset) -> Result<ExitCode> {
    let ctx = context(config, folder, classifier(&config.classifier)?, utc_offset, false)?;
    let marker = ProcessMarker::for_folder(ctx.target.root())?;
    let me = Processes::new().current().ok_or_raise(|| ErrorKind::Marker(marker.path().to_path_buf()))?;
    let guard = marker.claim(me)?;

    let result = shotname_library::watch(Arc::new(ctx), shutdown_signal()).await;
    if let Err(e) = guard.release() {
        tracing::warn!(error = ?e, "Could not remove process marker");
    }
    result.or_raise(|| ErrorKind::Watch)?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves on Ctrl-C, or on SIGTERM (what `stop` sends).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not listen for SIGTERM; only Ctrl-C will stop the watcher");
                _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotname_classify::MockClassifier;
    use std::ops::Deref;

    #[test]
    fn test_missing_api_key() {
        let config = ClassifierConfig { api_key: None, ..ClassifierConfig::default() };
        let err = classifier(&config).err().unwrap();
        assert!(matches!(err.deref(), ErrorKind::MissingApiKey));

        let config = ClassifierConfig { api_key: Some("  ".into()), ..ClassifierConfig::default() };
        assert!(classifier(&config).is_err());
    }

    #[test]
    fn test_classifier_from_config() {
        let config = ClassifierConfig { api_key: Some("sk-test".into()), retries: 2, ..ClassifierConfig::default() };
        assert!(classifier(&config).is_ok());
    }

    #[test]
    fn test_missing_folder_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("missing");
        let classifier = Arc::new(MockClassifier::describing("login page"));
        let err = context(&Config::default(), &folder, classifier, UtcOffset::UTC, false).err().unwrap();
        assert!(matches!(err.deref(), ErrorKind::Target(p) if p == &folder));
    }

    #[tokio::test]
    async fn test_batch_renames_with_configured_policy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Screenshot.PNG"), b"png").unwrap();
        std::fs::write(dir.path().join("Screenshot.tiff"), b"tiff").unwrap();
        let mut config = Config::default();
        config.stability.settle_ms = 10;
        config.naming.max_slug_length = 10;
        config.comments = false;
        let classifier = Arc::new(MockClassifier::describing("a login page for the admin panel"));

        let ctx = context(&config, dir.path(), classifier, UtcOffset::UTC, false).unwrap();
        let tally = batch(&ctx).await.unwrap();
        assert_eq!(tally, Tally { renamed: 1, ..Tally::default() });

        let mut names: Vec<_> =
            std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name().into_string().unwrap()).collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("_login-page.png"), "{names:?}");
        assert_eq!(names[1], "Screenshot.tiff");
    }
}
