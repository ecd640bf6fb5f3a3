// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Document store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Image download and upload settings
    #[serde(default)]
    pub media: MediaConfig,

    /// Digest selection and rendering settings
    #[serde(default)]
    pub digest: DigestConfig,

    /// Outbound mail settings
    #[serde(default)]
    pub mail: MailConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override deployment values and secrets from the environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("PRESS_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = var("WEBSITE_URL") {
            self.digest.website_url = url;
        }
        if let Some(key) = var("TOKEN_SIGNING_KEY") {
            self.digest.token_key = key;
        }
        if let Some(bucket) = var("S3_BUCKET") {
            self.media.bucket = bucket;
        }
        if let Some(region) = var("AWS_REGION") {
            self.media.region = region;
        }
        if let Some(endpoint) = var("MAIL_ENDPOINT") {
            self.mail.endpoint = Some(endpoint);
        }
        if let Some(api_key) = var("MAIL_API_KEY") {
            self.mail.api_key = Some(api_key);
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.per_domain_concurrency == 0 {
            return Err(AppError::validation(
                "crawler.per_domain_concurrency must be > 0",
            ));
        }
        if self.crawler.lock_stripes == 0 {
            return Err(AppError::validation("crawler.lock_stripes must be > 0"));
        }
        if self.media.workers == 0 {
            return Err(AppError::validation("media.workers must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.digest.similarity_threshold) {
            return Err(AppError::validation(
                "digest.similarity_threshold must be within 0..=1",
            ));
        }
        if self.digest.default_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::validation(format!(
                "digest.default_timezone '{}' is not an IANA zone",
                self.digest.default_timezone
            )));
        }
        if !(0..=MAX_LOOKBACK_HOURS).contains(&self.digest.lookback_hours) {
            return Err(AppError::validation(format!(
                "digest.lookback_hours must be within 0..={MAX_LOOKBACK_HOURS}"
            )));
        }
        if self.mail.backend == MailBackend::Http && self.mail.endpoint.is_none() {
            return Err(AppError::validation(
                "mail.endpoint is required for the http mail backend",
            ));
        }
        Ok(())
    }

    /// Settings required before any digest is delivered.
    pub fn validate_delivery(&self) -> Result<()> {
        self.validate()?;
        if self.digest.token_key.trim().is_empty() {
            return Err(AppError::validation(
                "digest.token_key (or TOKEN_SIGNING_KEY) is required to deliver digests",
            ));
        }
        Ok(())
    }
}

/// Upper bound of the digest look-back window (one year).
const MAX_LOOKBACK_HOURS: i64 = 24 * 366;

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Timeout for canonical/AMP metadata requests
    #[serde(default = "defaults::resolve_timeout")]
    pub resolve_timeout_secs: u64,

    /// Maximum sections harvested at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum concurrent requests against a single host
    #[serde(default = "defaults::per_domain_concurrency")]
    pub per_domain_concurrency: usize,

    /// Minimum seconds between two sweeps of the same channel
    #[serde(default = "defaults::staleness")]
    pub staleness_secs: u64,

    /// Maximum accepted items per section harvest
    #[serde(default = "defaults::item_limit")]
    pub item_limit: usize,

    /// Maximum item upserts in flight
    #[serde(default = "defaults::persist_concurrency")]
    pub persist_concurrency: usize,

    /// Number of hash-keyed lock stripes guarding upserts
    #[serde(default = "defaults::lock_stripes")]
    pub lock_stripes: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            resolve_timeout_secs: defaults::resolve_timeout(),
            max_concurrent: defaults::max_concurrent(),
            per_domain_concurrency: defaults::per_domain_concurrency(),
            staleness_secs: defaults::staleness(),
            item_limit: defaults::item_limit(),
            persist_concurrency: defaults::persist_concurrency(),
            lock_stripes: defaults::lock_stripes(),
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the `channels`, `headlines` and `readers` collections
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

/// Where derived images are pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    /// AWS S3 (requires the `s3` feature)
    S3,
    /// Local directory mirror
    Dir,
}

/// Image download and upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Local scratch directory for downloaded and derived images
    #[serde(default = "defaults::temp_dir")]
    pub temp_dir: PathBuf,

    #[serde(default = "defaults::object_backend")]
    pub backend: ObjectBackend,

    #[serde(default = "defaults::bucket")]
    pub bucket: String,

    /// Key prefix inside the bucket
    #[serde(default = "defaults::subfolder")]
    pub subfolder: String,

    #[serde(default = "defaults::region")]
    pub region: String,

    /// Canned ACL applied to every upload
    #[serde(default = "defaults::acl")]
    pub acl: String,

    /// Number of upload workers
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Deadline for a single upload in seconds
    #[serde(default = "defaults::upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Root directory for the `dir` backend
    #[serde(default = "defaults::mirror_dir")]
    pub mirror_dir: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            temp_dir: defaults::temp_dir(),
            backend: defaults::object_backend(),
            bucket: defaults::bucket(),
            subfolder: defaults::subfolder(),
            region: defaults::region(),
            acl: defaults::acl(),
            workers: defaults::workers(),
            upload_timeout_secs: defaults::upload_timeout(),
            mirror_dir: defaults::mirror_dir(),
        }
    }
}

/// Digest selection and rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Public website base URL passed to the template
    #[serde(default)]
    pub website_url: String,

    /// HMAC key for unsubscribe tokens
    #[serde(default)]
    pub token_key: String,

    /// Template name handed to the mail service
    #[serde(default = "defaults::template")]
    pub template: String,

    /// Maximum slots a single channel may occupy in one digest
    #[serde(default = "defaults::per_channel_cap")]
    pub per_channel_cap: usize,

    /// Jaro similarity at or above which a title counts as a duplicate
    #[serde(default = "defaults::similarity_threshold")]
    pub similarity_threshold: f64,

    /// Look-back window for readers that were never delivered to
    #[serde(default = "defaults::lookback_hours")]
    pub lookback_hours: i64,

    /// Maximum candidate headlines loaded per reader
    #[serde(default = "defaults::max_candidates")]
    pub max_candidates: usize,

    /// Highest harvest position eligible for a digest
    #[serde(default = "defaults::max_position")]
    pub max_position: u32,

    /// Timezone used when a reader has none
    #[serde(default = "defaults::default_timezone")]
    pub default_timezone: String,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            website_url: String::new(),
            token_key: String::new(),
            template: defaults::template(),
            per_channel_cap: defaults::per_channel_cap(),
            similarity_threshold: defaults::similarity_threshold(),
            lookback_hours: defaults::lookback_hours(),
            max_candidates: defaults::max_candidates(),
            max_position: defaults::max_position(),
            default_timezone: defaults::default_timezone(),
        }
    }
}

/// How digests leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    /// Write each envelope as JSON into a local outbox directory
    Outbox,
    /// POST each envelope to a templated-email HTTP API
    Http,
}

/// Outbound mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "defaults::mail_backend")]
    pub backend: MailBackend,

    #[serde(default = "defaults::outbox_dir")]
    pub outbox_dir: PathBuf,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            backend: defaults::mail_backend(),
            outbox_dir: defaults::outbox_dir(),
            endpoint: None,
            api_key: None,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::{MailBackend, ObjectBackend};

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; PressReview/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn resolve_timeout() -> u64 {
        5
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn per_domain_concurrency() -> usize {
        5
    }
    pub fn staleness() -> u64 {
        300
    }
    pub fn item_limit() -> usize {
        10
    }
    pub fn persist_concurrency() -> usize {
        32
    }
    pub fn lock_stripes() -> usize {
        64
    }

    // Store defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("storage")
    }

    // Media defaults
    pub fn temp_dir() -> PathBuf {
        PathBuf::from("tmp")
    }
    pub fn object_backend() -> ObjectBackend {
        ObjectBackend::S3
    }
    pub fn bucket() -> String {
        "thepressreview".into()
    }
    pub fn subfolder() -> String {
        "images/".into()
    }
    pub fn region() -> String {
        "us-east-1".into()
    }
    pub fn acl() -> String {
        "public-read".into()
    }
    pub fn workers() -> usize {
        4
    }
    pub fn upload_timeout() -> u64 {
        60
    }
    pub fn mirror_dir() -> PathBuf {
        PathBuf::from("uploaded")
    }

    // Digest defaults
    pub fn template() -> String {
        "newsletter_001.html".into()
    }
    pub fn per_channel_cap() -> usize {
        6
    }
    pub fn similarity_threshold() -> f64 {
        0.9
    }
    pub fn lookback_hours() -> i64 {
        12
    }
    pub fn max_candidates() -> usize {
        100
    }
    pub fn max_position() -> u32 {
        5
    }
    pub fn default_timezone() -> String {
        "Europe/London".into()
    }

    // Mail defaults
    pub fn mail_backend() -> MailBackend {
        MailBackend::Outbox
    }
    pub fn outbox_dir() -> PathBuf {
        PathBuf::from("outbox")
    }
}
