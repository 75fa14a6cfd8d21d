// src/config.rs

//! Application configuration.
//!
//! The same fields are reachable from the CLI and from a TOML config file;
//! CLI flags win. Validation enforces the platform's hard rate-limit floor
//! before anything touches the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Minimum allowed seconds between outbound requests. The platform asks
/// for at most one request per second; going below is a config error.
pub const REQUEST_INTERVAL_FLOOR: f64 = 1.0;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Board codes to include (or exclude, see `exclude`). Empty means
    /// every board the platform reports.
    #[serde(default)]
    pub boards: Vec<String>,

    /// Treat `boards` as an exclusion list instead of an inclusion list.
    #[serde(default)]
    pub exclude: bool,

    /// Minimum seconds between any two outbound requests, process-wide.
    #[serde(default = "defaults::request_time_limit")]
    pub request_time_limit: f64,

    /// Root directory of the archive tree.
    #[serde(default = "defaults::output_path")]
    pub output_path: PathBuf,

    /// Seconds to sleep between full crawl cycles.
    #[serde(default = "defaults::cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// HTTP client behavior.
    #[serde(default)]
    pub http: HttpConfig,
}

/// HTTP client and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the platform's JSON API.
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per work item per cycle before leaving it for the next
    /// cycle. Applies to catalog polls and thread fetches alike.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Upper bound on archival fetches in flight for one board.
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            boards: Vec::new(),
            exclude: false,
            request_time_limit: defaults::request_time_limit(),
            output_path: defaults::output_path(),
            cycle_interval_secs: defaults::cycle_interval_secs(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::api_base(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout_secs(),
            max_attempts: defaults::max_attempts(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Minimum interval between requests as a `Duration`.
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.request_time_limit)
    }

    /// Inter-cycle sleep as a `Duration`.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Validate configuration values; failures here abort startup.
    pub fn validate(&self) -> Result<()> {
        // The NaN/infinity check also keeps `min_interval` from panicking
        // in `Duration::from_secs_f64`.
        if !self.request_time_limit.is_finite()
            || self.request_time_limit < REQUEST_INTERVAL_FLOOR
        {
            return Err(AppError::config(format!(
                "request_time_limit must be at least {REQUEST_INTERVAL_FLOOR}, got {}",
                self.request_time_limit
            )));
        }
        if self.cycle_interval_secs == 0 {
            return Err(AppError::config("cycle_interval_secs must be > 0"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        if self.http.max_attempts == 0 {
            return Err(AppError::config("http.max_attempts must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::config("http.max_concurrent must be > 0"));
        }
        url::Url::parse(&self.http.api_base)
            .map_err(|e| AppError::config(format!("http.api_base is not a URL: {e}")))?;
        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn request_time_limit() -> f64 {
        super::REQUEST_INTERVAL_FLOOR
    }

    pub fn output_path() -> PathBuf {
        PathBuf::from("data")
    }

    pub fn cycle_interval_secs() -> u64 {
        60
    }

    pub fn api_base() -> String {
        "https://a.4cdn.org".to_string()
    }

    pub fn user_agent() -> String {
        format!("chanvault/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn timeout_secs() -> u64 {
        30
    }

    pub fn max_attempts() -> u32 {
        3
    }

    pub fn max_concurrent() -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_rate_floor_is_hard() {
        let config = Config {
            request_time_limit: 0.5,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_non_finite_rate_limit_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let config = Config {
                request_time_limit: bad,
                ..Config::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, AppError::Config(_)));
        }
    }

    #[test]
    fn test_floor_value_itself_is_accepted() {
        let config = Config {
            request_time_limit: REQUEST_INTERVAL_FLOOR,
            ..Config::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_partial_file_fills_defaults() {
        let toml = r#"
            boards = ["g", "sci"]
            exclude = true
            request_time_limit = 1.5

            [http]
            max_attempts = 5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.boards, vec!["g", "sci"]);
        assert!(config.exclude);
        assert_eq!(config.request_time_limit, 1.5);
        assert_eq!(config.http.max_attempts, 5);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.cycle_interval_secs, 60);
    }

    #[test]
    fn test_bad_api_base_rejected() {
        let mut config = Config::default();
        config.http.api_base = "not a url".into();
        assert!(config.validate().is_err());
    }
}
