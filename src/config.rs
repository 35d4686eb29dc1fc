//! Configuration management for Cangshu.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "Cangshu";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP fetching, retry and adaptive delay settings.
    pub fetch: FetchConfig,

    /// Content and novel acceptance thresholds.
    pub validation: ValidationConfig,

    /// Progress checkpoint settings.
    pub checkpoint: CheckpointConfig,

    /// Chapter index pagination discovery settings.
    pub pagination: PaginationConfig,

    /// Batch workflow settings.
    pub batch: BatchConfig,

    /// File paths.
    pub paths: PathsConfig,

    /// Additional site registrations, merged over the built-in table.
    pub sites: Vec<SiteEntry>,
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Delay applied before every request while the server is healthy.
    pub base_delay_ms: u64,

    /// Upper bound for the adaptive delay.
    pub max_delay_ms: u64,

    /// Amount the delay grows each time the error streak crosses the threshold.
    pub delay_increment_ms: u64,

    /// Amount the delay shrinks back towards the base after a success.
    pub relax_step_ms: u64,

    /// Consecutive transient failures before the delay grows.
    pub error_threshold: u32,

    /// Attempts per page for transient failures.
    pub max_retries: u32,

    /// Backoff base; attempt `n` waits `retry_base_ms * 2^n`.
    pub retry_base_ms: u64,

    /// Backoff cap.
    pub retry_max_ms: u64,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Bodies shorter than this are re-requested with a narrowed Accept-Encoding.
    pub min_body_bytes: usize,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Accept-Language header sent with every request.
    pub accept_language: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            delay_increment_ms: 500,
            relax_step_ms: 100,
            error_threshold: 3,
            max_retries: 5,
            retry_base_ms: 2000,
            retry_max_ms: 30_000,
            timeout_secs: 20,
            min_body_bytes: 100,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        }
    }
}

impl FetchConfig {
    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Content validation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum characters in a chapter body.
    pub min_chapter_chars: usize,

    /// Minimum CJK ideographs in a chapter body.
    pub min_han_chars: usize,

    /// Boilerplate pattern hits tolerated in a chapter body.
    pub max_boilerplate_hits: usize,

    /// Minimum number of chapters for a novel.
    pub min_chapter_count: usize,

    /// Minimum characters across all valid chapters.
    pub min_novel_chars: usize,

    /// Minimum fraction of valid chapters.
    pub min_valid_ratio: f64,

    /// How much of the page text is scanned for challenge keywords.
    pub anti_crawl_scan_chars: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_chapter_chars: 200,
            min_han_chars: 100,
            max_boilerplate_hits: 3,
            min_chapter_count: 1,
            min_novel_chars: 1000,
            min_valid_ratio: 0.5,
            anti_crawl_scan_chars: 500,
        }
    }
}

/// Progress checkpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Save progress every N chapters.
    pub interval: usize,

    /// Resume from an existing checkpoint instead of starting over.
    pub resume: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            resume: true,
        }
    }
}

/// Pagination discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Assumed chapters per index page when computing the page count.
    pub chapters_per_page: usize,

    /// Page-range links needed before they are used without probing.
    pub sufficient_page_links: usize,

    /// Page number used to probe URL templates.
    pub probe_page: usize,

    /// Attempts per template probe.
    pub probe_retries: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            chapters_per_page: 50,
            sufficient_page_links: 5,
            probe_page: 2,
            probe_retries: 2,
        }
    }
}

/// Batch workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Below this fraction of list-page completion markers, detail pages are probed.
    pub completion_signal_ratio: f64,

    /// Maximum candidates probed during completion verification.
    pub max_verify: usize,

    /// Candidates re-probed when the list page signal is trusted.
    pub spot_check: usize,

    /// Delay used by short-lived probe fetchers.
    pub probe_delay_ms: u64,

    /// Pause between novels in sequential mode.
    pub novel_gap_ms: u64,

    /// Novels processed concurrently.
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            completion_signal_ratio: 0.3,
            max_verify: 50,
            spot_check: 3,
            probe_delay_ms: 800,
            novel_gap_ms: 2000,
            workers: 1,
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory; novels land under `<output>/novels/`.
    pub output_directory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("data/training"),
        }
    }
}

/// A site registration from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteEntry {
    /// Registry key, usually the host name.
    pub name: String,

    /// Root URL of the site.
    pub base_url: String,

    /// Adapter identifier (`shuhaige` or `ixdzs8`).
    pub adapter: String,

    /// Category name to URL segment. Empty means the adapter's defaults.
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_retries == 0 {
            return Err(invalid("fetch.max_retries", "must be greater than 0"));
        }

        if self.fetch.max_delay_ms < self.fetch.base_delay_ms {
            return Err(invalid(
                "fetch.max_delay_ms",
                "must not be smaller than fetch.base_delay_ms",
            ));
        }

        if self.fetch.error_threshold == 0 {
            return Err(invalid("fetch.error_threshold", "must be greater than 0"));
        }

        if self.checkpoint.interval == 0 {
            return Err(invalid("checkpoint.interval", "must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.validation.min_valid_ratio) {
            return Err(invalid("validation.min_valid_ratio", "must be within [0, 1]"));
        }

        if !(0.0..=1.0).contains(&self.batch.completion_signal_ratio) {
            return Err(invalid(
                "batch.completion_signal_ratio",
                "must be within [0, 1]",
            ));
        }

        if self.pagination.chapters_per_page == 0 {
            return Err(invalid(
                "pagination.chapters_per_page",
                "must be greater than 0",
            ));
        }

        if self.batch.workers == 0 {
            return Err(invalid("batch.workers", "must be greater than 0"));
        }

        Ok(())
    }

    /// Returns the directory novels are written under.
    pub fn novels_dir(&self) -> PathBuf {
        self.paths.output_directory.join("novels")
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.error_threshold, 3);
        assert_eq!(config.checkpoint.interval, 10);
        assert!(config.checkpoint.resume);
        assert_eq!(config.validation.min_valid_ratio, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.sites.push(SiteEntry {
            name: "mirror.shuhaige.net".to_string(),
            base_url: "https://mirror.shuhaige.net".to_string(),
            adapter: "shuhaige".to_string(),
            categories: BTreeMap::from([("都市".to_string(), "DuShi".to_string())]),
        });
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.fetch.base_delay_ms, config.fetch.base_delay_ms);
        assert_eq!(loaded.sites.len(), 1);
        assert_eq!(loaded.sites[0].categories["都市"], "DuShi");
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.pagination.chapters_per_page, 50);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[checkpoint]\nresume = false\n").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(!config.checkpoint.resume);
        assert_eq!(config.checkpoint.interval, 10);
        assert_eq!(config.fetch.max_retries, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.fetch.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.checkpoint.interval = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.validation.min_valid_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch.workers = 0;
        assert!(config.validate().is_err());
    }
}
