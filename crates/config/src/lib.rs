//! Configuration loading and validation.
//!
//! Sources are merged with [`figment`], lowest precedence first:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. a TOML file (`--config`, or `config.toml` in the platform config
//!    directory, e.g. `~/.config/shotname/config.toml`),
//! 3. `OPENAI_API_KEY`, mapped to `classifier.api_key`,
//! 4. environment variables prefixed `SHOTNAME_`, with `__` separating
//!    nested keys (`SHOTNAME_STABILITY__SETTLE_MS=500`).
//!
//! Command-line flags are applied on top by the binary.
//!
//! ```toml
//! comments = true
//!
//! [classifier]
//! model = "gpt-4o-mini"
//! retries = 2
//!
//! [stability]
//! settle_ms = 1000
//! max_checks = 10
//!
//! [watch]
//! concurrency = 4
//! extensions = ["png", "jpg", "jpeg"]
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use shotname_storage::MAX_FILE_NAME_BYTES;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APPLICATION: &str = "shotname";
const ENV_PREFIX: &str = "SHOTNAME_";
const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// `YYYY-MM-DD_`
const DATE_PREFIX_BYTES: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub stability: StabilityConfig,
    pub naming: NamingConfig,
    pub rename: RenameConfig,
    pub watch: WatchConfig,
    /// Whether descriptions are written to the renamed file's comment.
    pub comments: bool,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            stability: StabilityConfig::default(),
            naming: NamingConfig::default(),
            rename: RenameConfig::default(),
            watch: WatchConfig::default(),
            comments: true,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Extra attempts for transient failures (rate limiting, network, 5xx).
    /// Zero means a single attempt per file.
    pub retries: u32,
    pub retry_backoff_ms: u64,
    /// Longest edge, in pixels, of the image sent to the service.
    pub max_image_dimension: u32,
}
impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: shotname_classify::DEFAULT_ENDPOINT.to_string(),
            model: shotname_classify::DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: 100,
            timeout_secs: 60,
            retries: 0,
            retry_backoff_ms: 2000,
            max_image_dimension: shotname_classify::DEFAULT_MAX_DIMENSION,
        }
    }
}
impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
// Keep the API key out of logs.
impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("retries", &self.retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_image_dimension", &self.max_image_dimension)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Interval between two size checks.
    pub settle_ms: u64,
    /// Size checks before giving up on a file that keeps growing.
    pub max_checks: u32,
}
impl Default for StabilityConfig {
    fn default() -> Self {
        Self { settle_ms: 1000, max_checks: 10 }
    }
}
impl StabilityConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Longest slug, in bytes, before the date prefix and extension.
    pub max_slug_length: usize,
    /// Disambiguation suffixes tried before giving up on a name.
    pub max_attempts: u32,
    /// Slug used when a description yields nothing usable.
    pub fallback: String,
}
impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            max_slug_length: 60,
            max_attempts: 1000,
            fallback: "screenshot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameConfig {
    /// Times a name collision detected at move time sends the file back for
    /// a new name.
    pub max_collision_retries: u32,
}
impl Default for RenameConfig {
    fn default() -> Self {
        Self { max_collision_retries: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Files processed at the same time.
    pub concurrency: usize,
    /// Accepted image extensions, without the leading dot.
    pub extensions: Vec<String>,
}
impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            extensions: ["png", "jpg", "jpeg", "webp", "gif", "bmp"].map(String::from).to_vec(),
        }
    }
}

impl Config {
    /// Location of the default configuration file, if the platform has a
    /// configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The merged provider stack, before extraction.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::Missing(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "Reading configuration file");
            figment = figment.merge(Toml::file(file));
        }
        Ok(figment
            .merge(Env::raw().only(&[API_KEY_ENV]).map(|_| "classifier.api_key".into()))
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Loads, normalizes and validates configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Config = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Lower-cases extensions and strips leading dots; trims the fallback.
    pub fn normalized(mut self) -> Self {
        self.watch.extensions = self
            .watch
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self.watch.extensions.dedup();
        self.naming.fallback = self.naming.fallback.trim().to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| exn::Exn::from(ErrorKind::Invalid(msg.to_string()));
        if self.stability.settle_ms == 0 {
            return Err(invalid("stability.settle_ms must be greater than zero"));
        }
        if self.stability.max_checks < 2 {
            return Err(invalid("stability.max_checks must be at least 2"));
        }
        if self.naming.max_attempts == 0 {
            return Err(invalid("naming.max_attempts must be greater than zero"));
        }
        if self.naming.max_slug_length == 0 {
            return Err(invalid("naming.max_slug_length must be greater than zero"));
        }
        if self.naming.max_slug_length > self.max_slug_length_for_file_names() {
            return Err(invalid("naming.max_slug_length would make file names longer than the filesystem allows"));
        }
        let fallback = &self.naming.fallback;
        let is_slug = !fallback.is_empty()
            && !fallback.starts_with('-')
            && !fallback.ends_with('-')
            && !fallback.contains("--")
            && fallback.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !is_slug {
            return Err(invalid("naming.fallback must be lowercase letters, digits and single hyphens"));
        }
        if fallback.len() > self.naming.max_slug_length {
            return Err(invalid("naming.fallback is longer than naming.max_slug_length"));
        }
        if self.watch.concurrency == 0 {
            return Err(invalid("watch.concurrency must be greater than zero"));
        }
        if self.watch.extensions.is_empty() {
            return Err(invalid("watch.extensions must not be empty"));
        }
        if !self.watch.extensions.iter().all(|e| e.chars().all(|c| c.is_ascii_alphanumeric())) {
            return Err(invalid("watch.extensions must be alphanumeric"));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(invalid("classifier.timeout_secs must be greater than zero"));
        }
        if self.classifier.max_image_dimension == 0 {
            return Err(invalid("classifier.max_image_dimension must be greater than zero"));
        }
        Ok(())
    }

    /// Longest slug that still fits a file name once the date prefix, the
    /// largest collision suffix and the longest allowed extension are added.
    fn max_slug_length_for_file_names(&self) -> usize {
        let suffix = match self.naming.max_attempts {
            0 | 1 => 0,
            n => 1 + (n - 1).to_string().len(),
        };
        let extension = 1 + self.watch.extensions.iter().map(String::len).max().unwrap_or(0);
        MAX_FILE_NAME_BYTES.saturating_sub(DATE_PREFIX_BYTES + suffix + extension)
    }
}
