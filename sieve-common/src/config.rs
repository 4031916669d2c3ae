//! Configuration management for the Sieve screener.
//!
//! The screener reads a single configuration file at `~/.sieve/config.json`,
//! optionally extended by `criteria.json` in the same directory.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SIEVE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SIEVE_LOG_LEVEL` → observability.log_level
//! - `SIEVE_LOG_FORMAT` → observability.log_format
//! - `SIEVE_OUTPUT_DIR` → output.dir
//! - `SIEVE_CONCURRENCY` → screener.concurrency
//! - `SIEVE_REQUEST_INTERVAL_MS` → data_source.request_interval_ms

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config_loader::load_modular_config;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map_or_else(
            || PathBuf::from(".sieve"),
            |dirs| dirs.home_dir().join(".sieve"),
        )
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration shared by every Sieve component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Market data source configuration
    #[serde(default)]
    pub data_source: DataSourceConfig,

    /// Screening criteria and run behaviour
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Result output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from the default directory.
    ///
    /// Missing files are not an error: defaults are used instead.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir())
    }

    /// Load configuration from a specific directory (config.json + criteria.json).
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(Some(dir.to_path_buf()))?;
        if value.as_object().map_or(true, |o| o.is_empty()) {
            tracing::info!(dir = %dir.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SIEVE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("SIEVE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(dir) = std::env::var("SIEVE_OUTPUT_DIR") {
            self.output.dir = dir;
        }
        if let Ok(n) = std::env::var("SIEVE_CONCURRENCY") {
            if let Ok(n) = n.parse() {
                self.screener.concurrency = n;
            }
        }
        if let Ok(ms) = std::env::var("SIEVE_REQUEST_INTERVAL_MS") {
            if let Ok(ms) = ms.parse() {
                self.data_source.request_interval_ms = ms;
            }
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Data Source
// ============================================================================

/// Market data provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Minimum spacing between per-security provider calls (milliseconds)
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Timeout applied to every provider call (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Calendar days of price history requested per security
    #[serde(default = "default_history_lookback_days")]
    pub history_lookback_days: i64,

    /// Exchanges making up the universe ("SH", "SZ")
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<String>,

    /// User agent sent to the provider
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: default_request_interval_ms(),
            timeout_secs: default_timeout_secs(),
            history_lookback_days: default_history_lookback_days(),
            exchanges: default_exchanges(),
            user_agent: default_user_agent(),
        }
    }
}

// ============================================================================
// Screener
// ============================================================================

/// Screening run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Thresholds for the six criteria
    #[serde(default)]
    pub criteria: CriteriaConfig,

    /// Securities evaluated concurrently after the pre-filter.
    /// 1 reproduces the strictly sequential behaviour.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Restrict the universe to these codes (empty = whole market)
    #[serde(default)]
    pub target_symbols: Vec<String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            criteria: CriteriaConfig::default(),
            concurrency: default_concurrency(),
            target_symbols: Vec::new(),
        }
    }
}

/// Thresholds for the screening criteria.
///
/// Market cap bounds are in 亿 (10^8 yuan); inflow is in yuan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaConfig {
    /// Minimum turnover rate (%)
    #[serde(default = "default_min_turnover")]
    pub min_turnover_pct: f64,

    /// Maximum turnover rate (%)
    #[serde(default = "default_max_turnover")]
    pub max_turnover_pct: f64,

    /// Minimum total market cap (亿)
    #[serde(default = "default_min_market_cap")]
    pub min_market_cap: f64,

    /// Maximum total market cap (亿)
    #[serde(default = "default_max_market_cap")]
    pub max_market_cap: f64,

    /// 10-day return must stay strictly below this (%)
    #[serde(default = "default_ten_day_return_max")]
    pub ten_day_return_max_pct: f64,

    /// Largest single-day gain over the last 10 bars must stay strictly below
    /// this (%). `None` disables the check.
    #[serde(default = "default_max_daily_gain")]
    pub max_daily_gain_pct: Option<f64>,

    /// Latest main-force net inflow must exceed this (yuan)
    #[serde(default = "default_min_main_inflow")]
    pub min_main_inflow: f64,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            min_turnover_pct: default_min_turnover(),
            max_turnover_pct: default_max_turnover(),
            min_market_cap: default_min_market_cap(),
            max_market_cap: default_max_market_cap(),
            ten_day_return_max_pct: default_ten_day_return_max(),
            max_daily_gain_pct: default_max_daily_gain(),
            min_main_inflow: default_min_main_inflow(),
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Result output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for result files (`~` is expanded)
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Formats to write (csv, json, markdown)
    #[serde(default = "default_output_formats")]
    pub formats: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            formats: default_output_formats(),
        }
    }
}

impl OutputConfig {
    /// Output directory with `~` and environment variables expanded.
    pub fn resolved_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).into_owned())
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_request_interval_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_history_lookback_days() -> i64 {
    100
}
fn default_exchanges() -> Vec<String> {
    vec!["SH".into()]
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)".into()
}
fn default_concurrency() -> usize {
    1
}
fn default_min_turnover() -> f64 {
    3.0
}
fn default_max_turnover() -> f64 {
    20.0
}
fn default_min_market_cap() -> f64 {
    20.0
}
fn default_max_market_cap() -> f64 {
    250.0
}
fn default_ten_day_return_max() -> f64 {
    15.0
}
fn default_max_daily_gain() -> Option<f64> {
    Some(7.0)
}
fn default_min_main_inflow() -> f64 {
    10_000_000.0
}
fn default_output_dir() -> String {
    ".".into()
}
fn default_output_formats() -> Vec<String> {
    vec!["csv".into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_criteria() {
        let c = CriteriaConfig::default();
        assert!((c.min_turnover_pct - 3.0).abs() < f64::EPSILON);
        assert!((c.max_turnover_pct - 20.0).abs() < f64::EPSILON);
        assert!((c.min_market_cap - 20.0).abs() < f64::EPSILON);
        assert!((c.max_market_cap - 250.0).abs() < f64::EPSILON);
        assert_eq!(c.max_daily_gain_pct, Some(7.0));
        assert!((c.min_main_inflow - 1e7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "screener": { "criteria": { "max_daily_gain_pct": 5.0 } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.screener.criteria.max_daily_gain_pct, Some(5.0));
        assert_eq!(config.screener.concurrency, 1);
        assert_eq!(config.data_source.request_interval_ms, 500);
        assert_eq!(config.data_source.exchanges, vec!["SH".to_string()]);
        assert_eq!(config.output.formats, vec!["csv".to_string()]);
    }

    #[test]
    fn test_daily_gain_check_can_be_disabled() {
        let json = r#"{ "max_daily_gain_pct": null }"#;
        let criteria: CriteriaConfig = serde_json::from_str(json).unwrap();
        assert_eq!(criteria.max_daily_gain_pct, None);
    }

    #[test]
    fn test_observability_aliases() {
        let json = r#"{ "level": "debug", "format": "json" }"#;
        let obs: ObservabilityConfig = serde_json::from_str(json).unwrap();
        assert_eq!(obs.log_level, "debug");
        assert_eq!(obs.log_format, "json");
    }

    #[test]
    fn test_load_from_dir_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_load_from_dir_reads_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "output": { "dir": "/tmp/sieve", "formats": ["csv", "json"] } }"#,
        )
        .unwrap();

        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.output.dir, "/tmp/sieve");
        assert_eq!(config.output.formats.len(), 2);
    }
}
