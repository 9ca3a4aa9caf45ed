/// Application configuration, persisted as TOML in a config directory.
///
///   <config_dir>/config.toml
///
/// Every field has a default, so a missing file (or a partial one) loads
/// cleanly. CLI flags override what the file says.
use crate::identity::IdentityConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Year the log was recorded in. Log timestamps carry no year; it matters
    /// for segments spanning a leap day or New Year.
    #[serde(default = "default_log_year")]
    pub log_year: i32,

    /// SQLite file backing the derived-data store. Empty = in-memory only.
    #[serde(default)]
    pub cache_db_path: PathBuf,

    /// Directory for the rolling log file. Empty = stderr.
    #[serde(default)]
    pub log_dir: PathBuf,

    /// Aggregate the segments of a multi-segment query in parallel.
    #[serde(default = "default_parallel_segments")]
    pub parallel_segments: bool,

    #[serde(default)]
    pub identity: IdentityConfig,
}

fn default_log_year() -> i32 { 2022 }
fn default_parallel_segments() -> bool { true }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_year:          default_log_year(),
            cache_db_path:     PathBuf::new(),
            log_dir:           PathBuf::new(),
            parallel_segments: default_parallel_segments(),
            identity:          IdentityConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        tracing::debug!("Config loaded from {:?}", path);
        Ok(cfg)
    } else {
        Ok(AppConfig::default())
    }
}

pub fn save(config: &AppConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}
