//! Config loader — reads `~/.oxigate/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `OxigateConfig::default()`)
//! 2. JSON file at `~/.oxigate/config.json`
//! 3. Environment variables (override JSON):
//!    - `OXIGATE_<PROVIDER>_API_KEY` — per-provider API key
//!    - `OXIGATE_AUTO_DISABLE` — `true`/`false`
//!    - `OXIGATE_ALERT_THRESHOLD_PCT` — percentage
//!
//! Loading is lenient: a missing or unparseable file logs a warning and
//! falls back to defaults, so a bad config never prevents startup.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::OxigateConfig;

/// Default config file path (`~/.oxigate/config.json`).
pub fn get_config_path() -> PathBuf {
    get_data_path().join("config.json")
}

/// The Oxigate data directory (`~/.oxigate/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".oxigate")
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

/// Load configuration from the default path (or an explicit one) + env vars.
pub fn load_config(path: Option<&Path>) -> OxigateConfig {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> OxigateConfig {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(OxigateConfig::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(OxigateConfig::default());
        }
    };

    let config: OxigateConfig = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(OxigateConfig::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &OxigateConfig, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&config_path, json)
}

/// Apply environment-variable overrides on top of a loaded config.
fn apply_env_overrides(mut config: OxigateConfig) -> OxigateConfig {
    for provider in &mut config.providers {
        let var = format!(
            "OXIGATE_{}_API_KEY",
            provider.name.to_ascii_uppercase().replace('-', "_")
        );
        if let Ok(key) = std::env::var(&var) {
            if !key.is_empty() {
                debug!(provider = %provider.name, "API key taken from {}", var);
                provider.api_key = key;
            }
        }
    }

    if let Ok(value) = std::env::var("OXIGATE_AUTO_DISABLE") {
        match value.parse::<bool>() {
            Ok(flag) => config.budget.auto_disable = flag,
            Err(_) => warn!("Ignoring invalid OXIGATE_AUTO_DISABLE={}", value),
        }
    }

    if let Ok(value) = std::env::var("OXIGATE_ALERT_THRESHOLD_PCT") {
        match value.parse::<f64>() {
            Ok(pct) if pct > 0.0 && pct <= 100.0 => config.budget.alert_threshold_pct = pct,
            _ => warn!("Ignoring invalid OXIGATE_ALERT_THRESHOLD_PCT={}", value),
        }
    }

    config
}
