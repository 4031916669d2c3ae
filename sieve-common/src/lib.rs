//! Sieve Common - Shared configuration, logging and error types.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.sieve/config.json` + `criteria.json`)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, CriteriaConfig, DataSourceConfig, ObservabilityConfig, OutputConfig, ScreenerConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

