use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

pub const API_URL_ENV: &str = "FITSYNC_API_URL";
pub const DEBUG_ENV: &str = "FITSYNC_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    pub api_base_url: String,
    /// Hosts probed in order when login cannot reach `api_base_url`.
    pub fallback_api_urls: Vec<String>,
    pub request_timeout_secs: u64,
    pub tick_interval_ms: u64,
    /// How many elapsed-counter ticks pass between session snapshots being persisted.
    pub persist_every_ticks: u32,
    pub storage_namespace: String,
    pub database_file: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            fallback_api_urls: Vec::new(),
            request_timeout_secs: 15,
            tick_interval_ms: 1000,
            persist_every_ticks: 1,
            storage_namespace: "@fitsync".into(),
            database_file: "fitsync.sqlite3".into(),
        }
    }
}

impl CoreConfig {
    /// Reads the config file if it exists, then applies env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring malformed config at {}: {err}; using defaults",
                    path.display()
                );
                CoreConfig::default()
            })
        } else {
            CoreConfig::default()
        };

        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }

        if lookup(DEBUG_ENV).is_some_and(|value| is_truthy(&value)) {
            self.persist_every_ticks = 1;
        }

        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn persist_every_ticks(&self) -> u32 {
        self.persist_every_ticks.max(1)
    }
}

/// Whether `FITSYNC_DEBUG` asks for verbose logging.
pub fn debug_requested() -> bool {
    std::env::var(DEBUG_ENV).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
