//! Configuration management.
//!
//! The configuration is read once at startup into an immutable [`Config`]
//! that is passed to every component at construction.

mod file_config;

pub use file_config::{
    default_config_path, find_config_file, save_config, update_config, CONFIG_ENV_VAR,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{AuthorRef, Platform};
use crate::utils::RetryConfig;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Per-platform settings keyed by platform id
    #[serde(default = "default_platforms")]
    pub platforms: BTreeMap<String, PlatformConfig>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub recommendations: RecommendationsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: UserConfig::default(),
            database: DatabaseConfig::default(),
            platforms: default_platforms(),
            fetch: FetchConfig::default(),
            retry: RetrySettings::default(),
            alerts: AlertsConfig::default(),
            recommendations: RecommendationsConfig::default(),
        }
    }
}

impl Config {
    /// Settings for a platform, if it appears in the configuration
    pub fn platform(&self, id: &str) -> Option<&PlatformConfig> {
        self.platforms.get(id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.platform(id).map(|p| p.enabled).unwrap_or(false)
    }

    /// Ids of enabled platforms, sorted
    pub fn enabled_platforms(&self) -> Vec<String> {
        self.platforms
            .iter()
            .filter(|(_, p)| p.enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of platforms present in the configuration but switched off
    pub fn disabled_platforms(&self) -> Vec<String> {
        self.platforms
            .iter()
            .filter(|(_, p)| !p.enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The author every adapter fetches for
    pub fn author_ref(&self) -> AuthorRef {
        let mut author = AuthorRef::new(self.user.name.clone());
        if let Some(orcid) = self.user.orcid.as_deref().filter(|s| !s.trim().is_empty()) {
            author = author.orcid(orcid.trim());
        }
        for (id, platform) in &self.platforms {
            if let Some(author_id) = platform.author_id.as_deref().filter(|s| !s.trim().is_empty()) {
                author = author.platform_id(&Platform::from_id(id), author_id.trim());
            }
        }
        author
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }

    /// Resolved database path
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(default_database_path)
    }

    /// Apply `<PLATFORM>_API_KEY` environment variables
    pub fn with_env_api_keys(mut self) -> Self {
        for (id, platform) in self.platforms.iter_mut() {
            let var = format!("{}_API_KEY", id.to_uppercase());
            if let Ok(key) = std::env::var(&var) {
                if !key.trim().is_empty() {
                    tracing::debug!("Using API key for {} from {}", id, var);
                    platform.api_key = Some(key);
                }
            }
        }
        self
    }
}

/// Who the citations are tracked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `<data_dir>/elephant/citations.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Settings for one platform adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Author id on this platform (S2 author id, Scholar profile id, ...)
    #[serde(default)]
    pub author_id: Option<String>,

    /// Override of the API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

impl PlatformConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

fn default_platforms() -> BTreeMap<String, PlatformConfig> {
    let mut platforms = BTreeMap::new();
    for id in ["orcid", "semantic_scholar", "arxiv", "crossref"] {
        platforms.insert(id.to_string(), PlatformConfig::enabled());
    }
    // Scraped without an API; opt-in only.
    platforms.insert("google_scholar".to_string(), PlatformConfig::default());
    platforms
}

/// Fetch cycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Minimum hours between syncs of one platform (unless `--force`)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause between page requests
    #[serde(default)]
    pub page_delay_ms: u64,

    /// Upper bound on records read from one platform per fetch
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            page_size: default_page_size(),
            page_delay_ms: 0,
            max_records: default_max_records(),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Minimum time between syncs, capped at [`MAX_INTERVAL_HOURS`]
    pub fn interval(&self) -> chrono::Duration {
        let hours = self.interval_hours.min(MAX_INTERVAL_HOURS) as i64;
        chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::MAX)
    }
}

/// Ten years; longer sync intervals are rejected
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365 * 10;

fn default_interval_hours() -> u64 {
    24
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_page_size() -> u32 {
    100
}

fn default_max_records() -> usize {
    1000
}

/// Backoff settings for rate-limited and timed-out requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    8000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum citation increase during one fetch that raises an alert
    #[serde(default = "default_alert_threshold")]
    pub min_citation_threshold: u32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_citation_threshold: default_alert_threshold(),
        }
    }
}

fn default_alert_threshold() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub check_trending_topics: bool,

    #[serde(default = "default_true")]
    pub suggest_collaborations: bool,

    #[serde(default = "default_true")]
    pub identify_low_visibility_papers: bool,

    /// Papers below this many citations after two years are "low visibility"
    #[serde(default = "default_low_visibility_threshold")]
    pub low_visibility_threshold: u32,
}

impl Default for RecommendationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_trending_topics: true,
            suggest_collaborations: true,
            identify_low_visibility_papers: true,
            low_visibility_threshold: default_low_visibility_threshold(),
        }
    }
}

fn default_low_visibility_threshold() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("elephant")
        .join("citations.db")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration not found at {0}; run `elephant init` first")]
    NotInitialized(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Load configuration from a file, layered with `ELEPHANT__` environment
/// variables (e.g. `ELEPHANT__FETCH__PAGE_SIZE=50`) and `<PLATFORM>_API_KEY`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    Ok(build(path, true)?.with_env_api_keys())
}

/// Load the file alone, without any environment layering.
///
/// This is what gets edited and written back, so values that only live in
/// the environment (API keys, `ELEPHANT__` overrides) never reach disk.
pub fn load_file_config(path: &Path) -> Result<Config, ConfigError> {
    build(path, false)
}

fn build(path: &Path, with_env: bool) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotInitialized(path.to_path_buf()));
    }

    let mut builder = config::Config::builder().add_source(config::File::from(path));
    if with_env {
        builder = builder.add_source(
            config::Environment::with_prefix("ELEPHANT")
                .prefix_separator("__")
                .separator("__"),
        );
    }

    let config: Config = builder.build()?.try_deserialize()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.fetch.page_size == 0 {
        return Err(ConfigError::Invalid("fetch.page_size must be positive".into()));
    }
    if config.fetch.interval_hours > MAX_INTERVAL_HOURS {
        return Err(ConfigError::Invalid(format!(
            "fetch.interval_hours must be at most {}",
            MAX_INTERVAL_HOURS
        )));
    }
    if config.retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::Invalid(
            "retry.backoff_multiplier must be at least 1.0".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fetch.interval_hours, 24);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.is_enabled("orcid"));
        assert!(config.is_enabled("semantic_scholar"));
        assert!(!config.is_enabled("google_scholar"));
        assert_eq!(config.disabled_platforms(), vec!["google_scholar"]);
        assert_eq!(config.recommendations.low_visibility_threshold, 5);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[user]
name = "Ada Lovelace"
orcid = "0000-0002-1825-0097"

[database]
path = "/tmp/elephant-test.db"

[platforms.semantic_scholar]
enabled = true
author_id = "1741101"

[platforms.google_scholar]
enabled = true
author_id = "abcDEF"

[fetch]
page_size = 25

[alerts]
min_citation_threshold = 3
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.user.name, "Ada Lovelace");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/elephant-test.db"));
        assert_eq!(config.fetch.page_size, 25);
        assert_eq!(config.fetch.interval_hours, 24);
        assert_eq!(config.alerts.min_citation_threshold, 3);
        // Only the platforms listed in the file are configured
        assert_eq!(
            config.enabled_platforms(),
            vec!["google_scholar", "semantic_scholar"]
        );

        let author = config.author_ref();
        assert_eq!(author.orcid.as_deref(), Some("0000-0002-1825-0097"));
        assert_eq!(author.id_for(&Platform::SemanticScholar), Some("1741101"));
        assert_eq!(author.id_for(&Platform::GoogleScholar), Some("abcDEF"));
    }

    #[test]
    fn test_missing_config_is_not_initialized() {
        let dir = tempdir().unwrap();
        let result = load_config(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::NotInitialized(_))));
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetch]\npage_size = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_huge_interval_rejected_and_capped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetch]\ninterval_hours = 9223372036854775807\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.fetch.interval_hours = u64::MAX;
        assert_eq!(
            config.fetch.interval(),
            chrono::Duration::hours(MAX_INTERVAL_HOURS as i64)
        );
    }

    #[test]
    fn test_retry_config_conversion() {
        let config = Config::default();
        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(8));
    }
}
