//! Application configuration management.
//!
//! Configuration is stored at `~/.config/wellcache/config.json`. Every field
//! has a default, so a missing or partial file is fine. The backend URL and
//! API key can also come from the environment (`WELLCACHE_BACKEND_URL`,
//! `WELLCACHE_API_KEY`), which wins over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "wellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_BACKEND_URL: &str = "WELLCACHE_BACKEND_URL";
const ENV_API_KEY: &str = "WELLCACHE_API_KEY";

/// Per-resource freshness windows, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlMinutes {
    pub feed: i64,
    pub history: i64,
    pub plan: i64,
}

impl Default for TtlMinutes {
    fn default() -> Self {
        Self {
            feed: 15,
            history: 30,
            plan: 60,
        }
    }
}

/// TTLs handed to cache reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub feed: Duration,
    pub history: Duration,
    pub plan: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlMinutes::default().into()
    }
}

impl From<TtlMinutes> for TtlPolicy {
    fn from(m: TtlMinutes) -> Self {
        Self {
            feed: minutes(m.feed),
            history: minutes(m.history),
            plan: minutes(m.plan),
        }
    }
}

/// Negative values mean "always stale"; values past the representable range
/// mean "never stale".
fn minutes(value: i64) -> Duration {
    Duration::try_minutes(value.max(0)).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// First segment of every cache key.
    pub namespace: String,
    pub ttl_minutes: TtlMinutes,
    pub page_size: usize,
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "wellness".to_string(),
            ttl_minutes: TtlMinutes::default(),
            page_size: 10,
            backend_url: None,
            api_key: None,
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override backend settings from `lookup` (the environment, in practice).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.is_empty()) {
            self.backend_url = Some(url);
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed cache and the session.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn ttls(&self) -> TtlPolicy {
        self.ttl_minutes.into()
    }

    pub fn page_size(&self) -> usize {
        self.page_size.max(1)
    }
}
