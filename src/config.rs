//! Configuration for prism
//!
//! Read-only. Settings come from a TOML file (`--config`, `PRISM_CONFIG` or
//! `./.prism.toml`) and are then overridden by `PRISM_*` environment variables.

use crate::defaults::Defaults;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config file looked up in the working directory when no path is given
pub const IMPLICIT_CONFIG_FILE: &str = ".prism.toml";

pub const CONFIG_PATH_ENV: &str = "PRISM_CONFIG";
pub const THRESHOLD_ENV: &str = "PRISM_DEFAULT_THRESHOLD";
pub const FALLBACK_WINDOW_ENV: &str = "PRISM_FALLBACK_WINDOW";
pub const RATIO_THRESHOLD_ENV: &str = "PRISM_RATIO_THRESHOLD";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Load config, then apply environment overrides.
    ///
    /// An explicit path (argument or `PRISM_CONFIG`) must exist and parse.
    /// The implicit `./.prism.toml` is optional, and a corrupt one only warns.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_required(&path)?,
            None => Self::load_optional(Path::new(IMPLICIT_CONFIG_FILE)),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_required(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn load_optional(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        };
        match Self::from_toml_str(&content) {
            Ok(config) => config,
            Err(err) => {
                let reason = format!("{:#}", err);
                warn!(
                    path = %path.display(),
                    error = %reason,
                    "config file is corrupted, defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Apply `PRISM_*` overrides read through `lookup`. Unparsable values are skipped.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(THRESHOLD_ENV) {
            match value.trim().parse::<f64>() {
                Ok(threshold) => self.defaults.threshold = threshold,
                Err(_) => warn!(var = THRESHOLD_ENV, value = %value, "ignoring unparsable override"),
            }
        }
        if let Some(value) = lookup(FALLBACK_WINDOW_ENV) {
            let window = value.trim();
            if window.is_empty() {
                warn!(var = FALLBACK_WINDOW_ENV, "ignoring empty override");
            } else {
                self.defaults.fallback_window = window.to_string();
            }
        }
        if let Some(value) = lookup(RATIO_THRESHOLD_ENV) {
            match value.trim().parse::<f64>() {
                Ok(ratio) => self.defaults.ratio_threshold = ratio,
                Err(_) => warn!(var = RATIO_THRESHOLD_ENV, value = %value, "ignoring unparsable override"),
            }
        }
    }
}
