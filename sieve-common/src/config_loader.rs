//! Modular configuration loader.
//!
//! Supports loading configuration from multiple files:
//! - `config.json` - Core configuration
//! - `criteria.json` - Screening thresholds, merged into `screener.criteria`
//!
//! Files are loaded from `~/.sieve/` with proper merging.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::config_dir;
use crate::error::{Error, Result, ResultExt};

/// Configuration file names
pub const CONFIG_FILES: &[&str] = &["config.json", "criteria.json"];

/// Load a JSON file and return its contents as a Value.
/// Returns None if file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;

    let value: Value =
        serde_json::from_str(&content).context(format!("Failed to parse {}", path.display()))?;

    if !value.is_object() {
        return Err(Error::Config(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    }

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => merge_json(target_value, source_value),
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load modular configuration from the config directory.
///
/// Priority (lowest to highest):
/// 1. config.json
/// 2. criteria.json (overrides `screener.criteria`)
/// 3. Environment variables (applied separately)
pub fn load_modular_config(dir: Option<PathBuf>) -> Result<Value> {
    let cfg_dir = dir.unwrap_or_else(config_dir);

    let mut config = load_json_file(&cfg_dir.join("config.json"))?
        .unwrap_or(Value::Object(Default::default()));

    tracing::debug!("Loading modular config from {}", cfg_dir.display());

    if let Some(criteria) = load_json_file(&cfg_dir.join("criteria.json"))? {
        if let Some(config_obj) = config.as_object_mut() {
            let screener = config_obj
                .entry("screener")
                .or_insert(Value::Object(Default::default()));

            if let Some(screener_obj) = screener.as_object_mut() {
                match screener_obj.get_mut("criteria") {
                    Some(existing) => merge_json(existing, criteria),
                    None => {
                        screener_obj.insert("criteria".to_string(), criteria);
                    }
                }
            }
        }
        tracing::debug!("Loaded criteria.json");
    }

    Ok(config)
}

/// Check which modular config files exist.
pub fn check_modular_files(dir: Option<PathBuf>) -> Vec<(String, bool)> {
    let cfg_dir = dir.unwrap_or_else(config_dir);

    CONFIG_FILES
        .iter()
        .map(|file| (file.to_string(), cfg_dir.join(file).exists()))
        .collect()
}
