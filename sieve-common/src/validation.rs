//! Configuration validation.
//!
//! Provides validation logic for configuration fields to ensure
//! all values are present and within valid ranges.

use std::str::FromStr;
use thiserror::Error;

use crate::config::{
    Config, CriteriaConfig, DataSourceConfig, ObservabilityConfig, OutputConfig, ScreenerConfig,
};

/// Longest price history window accepted, in calendar days.
pub const MAX_HISTORY_LOOKBACK_DAYS: i64 = 3650;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid range {field}: min {min} > max {max}")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration, collecting every violation.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 4] = [
            &self.observability,
            &self.data_source,
            &self.screener,
            &self.output,
        ];

        let mut errors: Vec<ValidationError> = sections
            .iter()
            .filter_map(|s| s.validate().err())
            .flat_map(|e| match e {
                ValidationError::Multiple(inner) => inner,
                other => vec![other],
            })
            .collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

/// Log level values accepted by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("unknown level '{s}'"),
            }),
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        // RUST_LOG-style directives ("info,hyper=warn") are passed through untouched
        if !self.log_level.contains(|c: char| c == '=' || c == ',') {
            if let Err(e) = self.log_level.parse::<LogLevel>() {
                errors.push(e);
            }
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            errors.push(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected 'json' or 'pretty', got '{}'", self.log_format),
            });
        }

        collect(errors)
    }
}

impl Validate for DataSourceConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.request_interval_ms == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "data_source.request_interval_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.timeout_secs == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "data_source.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        // MA20 needs at least 20 trading days, roughly 28 calendar days
        if self.history_lookback_days < 30 {
            errors.push(ValidationError::InvalidValue {
                field: "data_source.history_lookback_days".into(),
                reason: format!("{} is too short for a 20-day average", self.history_lookback_days),
            });
        } else if self.history_lookback_days > MAX_HISTORY_LOOKBACK_DAYS {
            errors.push(ValidationError::InvalidValue {
                field: "data_source.history_lookback_days".into(),
                reason: format!(
                    "{} exceeds the maximum of {MAX_HISTORY_LOOKBACK_DAYS}",
                    self.history_lookback_days
                ),
            });
        }
        if self.exchanges.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "data_source.exchanges".into(),
            });
        }
        for exchange in &self.exchanges {
            if !matches!(exchange.to_uppercase().as_str(), "SH" | "SZ") {
                errors.push(ValidationError::InvalidValue {
                    field: "data_source.exchanges".into(),
                    reason: format!("unsupported exchange '{exchange}'"),
                });
            }
        }

        collect(errors)
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.concurrency == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "screener.concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        if let Err(e) = self.criteria.validate() {
            match e {
                ValidationError::Multiple(inner) => errors.extend(inner),
                other => errors.push(other),
            }
        }

        collect(errors)
    }
}

impl Validate for CriteriaConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.min_turnover_pct > self.max_turnover_pct {
            errors.push(ValidationError::InvalidRange {
                field: "screener.criteria.turnover_pct".into(),
                min: self.min_turnover_pct,
                max: self.max_turnover_pct,
            });
        }
        if self.min_market_cap > self.max_market_cap {
            errors.push(ValidationError::InvalidRange {
                field: "screener.criteria.market_cap".into(),
                min: self.min_market_cap,
                max: self.max_market_cap,
            });
        }
        let finite = [
            ("min_turnover_pct", self.min_turnover_pct),
            ("max_turnover_pct", self.max_turnover_pct),
            ("min_market_cap", self.min_market_cap),
            ("max_market_cap", self.max_market_cap),
            ("ten_day_return_max_pct", self.ten_day_return_max_pct),
            ("min_main_inflow", self.min_main_inflow),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                errors.push(ValidationError::InvalidValue {
                    field: format!("screener.criteria.{name}"),
                    reason: "must be a finite number".into(),
                });
            }
        }
        if let Some(cap) = self.max_daily_gain_pct {
            if !cap.is_finite() || cap <= 0.0 {
                errors.push(ValidationError::InvalidValue {
                    field: "screener.criteria.max_daily_gain_pct".into(),
                    reason: format!("{cap} is not a positive finite percentage"),
                });
            }
        }

        collect(errors)
    }
}

impl Validate for OutputConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.dir.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "output.dir".into(),
            });
        }
        for format in &self.formats {
            if !matches!(format.to_lowercase().as_str(), "csv" | "json" | "markdown" | "md") {
                errors.push(ValidationError::InvalidValue {
                    field: "output.formats".into(),
                    reason: format!("unknown format '{format}'"),
                });
            }
        }

        collect(errors)
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_turnover_range() {
        let mut criteria = CriteriaConfig::default();
        criteria.min_turnover_pct = 25.0;
        let err = criteria.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRange { .. }));
    }

    #[test]
    fn test_multiple_errors_are_flattened() {
        let mut config = Config::default();
        config.screener.concurrency = 0;
        config.screener.criteria.min_market_cap = 500.0;
        config.data_source.request_interval_ms = 0;

        match config.validate().unwrap_err() {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_directive_log_level_accepted() {
        let obs = ObservabilityConfig {
            log_level: "info,sieve_screener=debug".into(),
            ..Default::default()
        };
        assert!(obs.validate().is_ok());
    }

    #[test]
    fn test_unknown_exchange_rejected() {
        let mut ds = DataSourceConfig::default();
        ds.exchanges = vec!["NYSE".into()];
        assert!(ds.validate().is_err());
    }

    #[test]
    fn test_history_lookback_bounds() {
        let mut ds = DataSourceConfig::default();
        ds.history_lookback_days = MAX_HISTORY_LOOKBACK_DAYS;
        assert!(ds.validate().is_ok());

        ds.history_lookback_days = MAX_HISTORY_LOOKBACK_DAYS + 1;
        assert!(ds.validate().is_err());

        ds.history_lookback_days = i64::MAX / 1000;
        assert!(ds.validate().is_err());
    }

    #[test]
    fn test_max_daily_gain_must_be_positive_and_finite() {
        let mut criteria = CriteriaConfig::default();
        criteria.max_daily_gain_pct = None;
        assert!(criteria.validate().is_ok());

        for bad in [f64::NAN, f64::INFINITY, -1.0, 0.0] {
            criteria.max_daily_gain_pct = Some(bad);
            assert!(criteria.validate().is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_unknown_output_format_rejected() {
        let output = OutputConfig {
            dir: ".".into(),
            formats: vec!["xlsx".into()],
        };
        assert!(output.validate().is_err());
    }
}
