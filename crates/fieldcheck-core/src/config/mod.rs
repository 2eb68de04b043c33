//! Engine configuration.
//!
//! Values come from environment variables (a `.env` file is honored by the
//! binaries) and fall back to defaults suited to low-end field devices.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::CompressionOptions;
use crate::util::{normalize_base_url, normalize_text_option};
use crate::{Error, Result};

const ENV_API_BASE_URL: &str = "FIELDCHECK_API_BASE_URL";
const ENV_DATA_DIR: &str = "FIELDCHECK_DATA_DIR";
const ENV_RETRY_LIMIT: &str = "FIELDCHECK_RETRY_LIMIT";
const ENV_BACKOFF_BASE_MS: &str = "FIELDCHECK_BACKOFF_BASE_MS";
const ENV_BACKOFF_MAX_MS: &str = "FIELDCHECK_BACKOFF_MAX_MS";
const ENV_HTTP_TIMEOUT_SECS: &str = "FIELDCHECK_HTTP_TIMEOUT_SECS";
const ENV_AUTOSAVE_DEBOUNCE_MS: &str = "FIELDCHECK_AUTOSAVE_DEBOUNCE_MS";
const ENV_PHOTO_MAX_DIMENSION: &str = "FIELDCHECK_PHOTO_MAX_DIMENSION";
const ENV_PHOTO_JPEG_QUALITY: &str = "FIELDCHECK_PHOTO_JPEG_QUALITY";

const DEFAULT_RETRY_LIMIT: u32 = 5;
const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 1_500;

const DATABASE_FILE_NAME: &str = "fieldcheck.db";
const PHOTOS_DIR_NAME: &str = "photos";

/// Automatic retry budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which a draft is left for manual sync.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles with every further failure.
    pub base_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_LIMIT,
            base_delay: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy without backoff delays (every automatic pass may retry).
    #[must_use]
    pub const fn without_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub const fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }

    /// Wait imposed after `retry_count` consecutive failures.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        let factor = 1_u32.checked_shl(retry_count - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether an automatic flush may attempt a record with this retry state.
    pub fn allows_automatic_attempt(
        &self,
        retry_count: u32,
        last_attempt_at_ms: Option<i64>,
        now_ms: i64,
    ) -> bool {
        if self.is_exhausted(retry_count) {
            return false;
        }
        let Some(last_attempt_at_ms) = last_attempt_at_ms else {
            return true;
        };
        let delay_ms = i64::try_from(self.backoff_delay(retry_count).as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(last_attempt_at_ms) >= delay_ms
    }
}

/// Runtime configuration for the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Backend base URL; `None` keeps the engine local-only.
    pub api_base_url: Option<String>,
    /// Root of durable app storage (database + promoted photos).
    pub data_dir: PathBuf,
    pub retry: RetryPolicy,
    pub compression: CompressionOptions,
    pub autosave_debounce: Duration,
    pub http_timeout: Duration,
}

impl EngineConfig {
    /// Local-only configuration rooted at `data_dir` with default tuning.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: None,
            data_dir: data_dir.into(),
            retry: RetryPolicy::default(),
            compression: CompressionOptions::default(),
            autosave_debounce: Duration::from_millis(DEFAULT_AUTOSAVE_DEBOUNCE_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        parse_config(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    #[must_use]
    pub fn photos_dir(&self) -> PathBuf {
        self.data_dir.join(PHOTOS_DIR_NAME)
    }
}

/// Default durable data directory for the current platform.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(env::temp_dir)
        .join("fieldcheck")
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<EngineConfig> {
    let data_dir = normalize_text_option(lookup(ENV_DATA_DIR))
        .map_or_else(default_data_dir, PathBuf::from);
    let mut config = EngineConfig::new(data_dir);

    if let Some(raw) = normalize_text_option(lookup(ENV_API_BASE_URL)) {
        let base = normalize_base_url(&raw)
            .map_err(|error| Error::Config(format!("{ENV_API_BASE_URL}: {error}")))?;
        config.api_base_url = Some(base);
    }

    if let Some(limit) = parse_number::<u32>(&lookup, ENV_RETRY_LIMIT)? {
        if limit == 0 {
            return Err(Error::Config(format!(
                "{ENV_RETRY_LIMIT} must be greater than zero"
            )));
        }
        config.retry.max_attempts = limit;
    }
    if let Some(ms) = parse_number::<u64>(&lookup, ENV_BACKOFF_BASE_MS)? {
        config.retry.base_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_number::<u64>(&lookup, ENV_BACKOFF_MAX_MS)? {
        config.retry.max_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = parse_number::<u64>(&lookup, ENV_HTTP_TIMEOUT_SECS)? {
        config.http_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(ms) = parse_number::<u64>(&lookup, ENV_AUTOSAVE_DEBOUNCE_MS)? {
        config.autosave_debounce = Duration::from_millis(ms);
    }
    if let Some(dimension) = parse_number::<u32>(&lookup, ENV_PHOTO_MAX_DIMENSION)? {
        if dimension == 0 {
            return Err(Error::Config(format!(
                "{ENV_PHOTO_MAX_DIMENSION} must be greater than zero"
            )));
        }
        config.compression.max_dimension = dimension;
    }
    if let Some(quality) = parse_number::<u8>(&lookup, ENV_PHOTO_JPEG_QUALITY)? {
        if !(1..=100).contains(&quality) {
            return Err(Error::Config(format!(
                "{ENV_PHOTO_JPEG_QUALITY} must be between 1 and 100"
            )));
        }
        config.compression.jpeg_quality = quality;
    }

    Ok(config)
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = normalize_text_option(lookup(key)) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<EngineConfig> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn parse_config_applies_defaults() {
        let mut map = HashMap::new();
        map.insert(ENV_DATA_DIR, "/var/lib/fieldcheck");
        let config = parse_from_map(&map).unwrap();

        assert_eq!(config.api_base_url, None);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/fieldcheck/fieldcheck.db")
        );
        assert_eq!(config.photos_dir(), PathBuf::from("/var/lib/fieldcheck/photos"));
    }

    #[test]
    fn parse_config_normalizes_base_url() {
        let mut map = HashMap::new();
        map.insert(ENV_API_BASE_URL, " https://erp.example.com/api/ ");
        let config = parse_from_map(&map).unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://erp.example.com/api")
        );
    }

    #[test]
    fn parse_config_rejects_bad_values() {
        let mut map = HashMap::new();
        map.insert(ENV_API_BASE_URL, "erp.example.com");
        assert!(matches!(parse_from_map(&map), Err(Error::Config(_))));

        let mut map = HashMap::new();
        map.insert(ENV_RETRY_LIMIT, "many");
        assert!(matches!(parse_from_map(&map), Err(Error::Config(_))));

        let mut map = HashMap::new();
        map.insert(ENV_PHOTO_JPEG_QUALITY, "0");
        assert!(matches!(parse_from_map(&map), Err(Error::Config(_))));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(10));
    }

    #[test]
    fn automatic_attempts_respect_cap_and_window() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        };
        assert!(policy.allows_automatic_attempt(0, None, 0));
        assert!(!policy.allows_automatic_attempt(2, Some(10_000), 11_000));
        assert!(policy.allows_automatic_attempt(2, Some(10_000), 12_000));
        assert!(!policy.allows_automatic_attempt(5, None, i64::MAX));
    }
}
