use crate::domain::views::DEFAULT_WORKDAY_MINUTES;
use crate::persistence::atomic_write;
use crate::ticker::DEFAULT_TICK_MS;
use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the optional config document inside the data directory
pub const CONFIG_FILE: &str = "config.json";

/// Engine settings stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Period of the overdue sweep
    pub tick_interval_ms: u64,
    /// Assumed working day used for free-time calculations
    pub workday_minutes: i64,
    /// Default horizon of the upcoming view
    pub upcoming_days: u32,
    /// `tracing` filter used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_MS,
            workday_minutes: DEFAULT_WORKDAY_MINUTES,
            upcoming_days: 7,
            log_filter: "tempo=info".to_string(),
        }
    }
}

impl Config {
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn workday(&self) -> Duration {
        Duration::minutes(self.workday_minutes.max(0))
    }
}

/// Load config from a config.json file, defaults when it doesn't exist
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: Config = serde_json::from_str(&content)
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}

/// Save config to a config.json file
pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    atomic_write(path, &json)?;
    Ok(())
}
