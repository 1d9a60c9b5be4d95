//! Engine configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::processing::MAX_TEMPLATE_RETRIES;

/// Top-level assay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retries allowed before template processing gives up on its
    /// constraints.
    #[serde(default = "default_max_template_retries")]
    pub max_template_retries: u32,
    /// Fixed seed for every random source; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Max concurrent attempts when simulating.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Default tracing filter.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_max_template_retries() -> u32 {
    MAX_TEMPLATE_RETRIES
}
fn default_parallelism() -> usize {
    4
}
fn default_log_filter() -> String {
    "assay=info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_template_retries: default_max_template_retries(),
            seed: None,
            parallelism: default_parallelism(),
            log_filter: default_log_filter(),
        }
    }
}

/// Load configuration from `assay.toml` in the current directory, if any.
///
/// `ASSAY_SEED` overrides the configured seed.
pub fn load_config() -> Result<EngineConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default location.
pub fn load_config_from(path: Option<&Path>) -> Result<EngineConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => Some(PathBuf::from("assay.toml")).filter(|p| p.exists()),
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Ok(seed) = std::env::var("ASSAY_SEED") {
        config.seed = Some(
            seed.parse()
                .with_context(|| format!("ASSAY_SEED is not a number: {seed}"))?,
        );
    }
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(content)?;
    anyhow::ensure!(config.parallelism > 0, "parallelism must be at least 1");
    Ok(config)
}
