//! Configuration types for datastore-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// OAuth2 client credentials used for the client-credentials token exchange
///
/// Both fields are required; [`crate::auth::authenticate`] rejects an empty
/// id or secret before issuing any request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Client identifier (consumer key)
    #[serde(default)]
    pub client_id: String,

    /// Client secret (consumer secret)
    #[serde(default)]
    pub client_secret: String,
}

/// Remote endpoint locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Token exchange endpoint (default: EUMETSAT Data Store token API)
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Base URL for product downloads; product URLs are built as
    /// `<base>/collections/<collection>/products/<id>`
    #[serde(default = "default_download_base")]
    pub download_base: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            download_base: default_download_base(),
        }
    }
}

/// Extraction behavior for downloaded archives
///
/// When present, each downloaded archive has the first member matching
/// `member_suffix` extracted into a per-archive directory under `dir`, and
/// the archive is deleted afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Directory under which per-archive extraction directories are created
    pub dir: PathBuf,

    /// Member name suffix selecting the file to extract (default: ".nat")
    #[serde(default = "default_member_suffix")]
    pub member_suffix: String,
}

/// Retry behavior for download attempts
///
/// `max_attempts: None` retries indefinitely, which mirrors the historical
/// behavior of this pipeline; set a bound when talking to rate-limited APIs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (default: None = unbounded)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Main configuration for [`crate::BulkDownloader`]
///
/// A single immutable value handed to the downloader at construction; no
/// global state. All fields have serde defaults so a partial JSON/TOML
/// document deserializes into a usable configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// OAuth2 client credentials
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Remote endpoint locations
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Catalog collection the product identifiers belong to
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Directory downloaded archives are written to (default: ".")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Extraction settings; None disables extraction entirely
    #[serde(default)]
    pub extract: Option<ExtractConfig>,

    /// Number of concurrent download workers (default: 1)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delete and re-download archives that already exist locally
    #[serde(default)]
    pub force: bool,

    /// How long before token expiry the refresher re-authenticates
    /// (default: 40 seconds)
    #[serde(default = "default_refresh_margin", with = "duration_serde")]
    pub refresh_margin: Duration,

    /// Retry behavior for download attempts
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: CredentialsConfig::default(),
            endpoints: EndpointConfig::default(),
            collection: default_collection(),
            output_dir: default_output_dir(),
            extract: None,
            workers: default_workers(),
            force: false,
            refresh_margin: default_refresh_margin(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Validate settings that would otherwise fail deep inside the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config {
                message: "worker count must be at least 1".to_string(),
                key: Some("workers".to_string()),
            });
        }
        if self.collection.is_empty() {
            return Err(Error::Config {
                message: "collection must not be empty".to_string(),
                key: Some("collection".to_string()),
            });
        }
        Ok(())
    }
}

fn default_token_url() -> String {
    "https://api.eumetsat.int/token".to_string()
}

fn default_download_base() -> String {
    "https://api.eumetsat.int/data/download/1.0.0".to_string()
}

fn default_collection() -> String {
    "EO:EUM:DAT:MSG:HRSEVIRI".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_member_suffix() -> String {
    ".nat".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_refresh_margin() -> Duration {
    Duration::from_secs(40)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Serialize Duration as integer seconds for readable config files
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
