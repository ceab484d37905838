use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use crate::bundle::BundleConfig;
pub use crate::hub::HubConfig;
pub use crate::rules::RulesConfig;

/// Complete Pulse configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
}

impl PulseConfig {
    /// Override settings from `PULSE_*` environment variables.
    ///
    /// Unparseable values are ignored and the configured value kept.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("PULSE_MAX_CHAIN_DEPTH") {
            if let Ok(n) = v.parse::<u32>() {
                self.rules.max_chain_depth = n;
            }
        }
        if let Some(v) = var("PULSE_RESPONSE_TIMEOUT_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.hub.default_response_timeout_ms = n;
            }
        }
        if let Some(v) = var("PULSE_BUNDLE_URL") {
            if !v.trim().is_empty() {
                self.bundle.url = Some(v);
            }
        }
        if let Some(v) = var("PULSE_CACHE_DIR") {
            if !v.trim().is_empty() {
                self.bundle.cache_dir = PathBuf::from(v);
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<PulseConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: PulseConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}
