use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::sync::SchedulerConfig;

pub const ENV_SERVER_URL: &str = "HEALTHSYNC_SERVER_URL";
pub const ENV_AUTH_TOKEN: &str = "HEALTHSYNC_AUTH_TOKEN";
pub const ENV_DEBUG: &str = "HEALTHSYNC_DEBUG";

const DEBUG_TICK_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub auth_token: Option<String>,
    pub tick_interval_secs: u64,
    pub max_batch_size: usize,
    pub source_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub location_fix_attempts: u32,
    pub location_poll_interval_ms: u64,
    pub location_max_age_secs: u64,
    /// Simulated host budget per cycle; unset means unbounded.
    pub grant_budget_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            auth_token: None,
            tick_interval_secs: 60,
            max_batch_size: 60,
            source_timeout_secs: 10,
            request_timeout_secs: 30,
            location_fix_attempts: 5,
            location_poll_interval_ms: 1000,
            location_max_age_secs: 120,
            grant_budget_secs: None,
        }
    }
}

impl Settings {
    /// Applies `HEALTHSYNC_*` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.trim().is_empty()) {
            self.server_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.auth_token = Some(token.trim().to_string());
        }
        if lookup(ENV_DEBUG).is_some_and(|v| is_truthy(&v)) {
            self.tick_interval_secs = DEBUG_TICK_SECS;
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(self.tick_interval_secs.max(1)),
            max_batch_size: self.max_batch_size.max(1),
            source_timeout: Duration::from_secs(self.source_timeout_secs),
            location_fix_attempts: self.location_fix_attempts,
            location_poll_interval: Duration::from_millis(self.location_poll_interval_ms),
            location_max_age: Duration::from_secs(self.location_max_age_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn grant_budget(&self) -> Option<Duration> {
        self.grant_budget_secs.map(Duration::from_secs)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring malformed settings at {}: {err}",
                    path.display()
                );
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File contents with process environment overrides applied.
    pub fn effective(&self) -> Settings {
        let mut settings = self.file_settings();
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    pub fn file_settings(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[cfg(test)]
    fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
        self.persist(&guard)
    }

    /// Writes the current (default, if absent) settings so they can be edited.
    pub fn write_if_missing(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.persist(&self.file_settings())?;
        Ok(true)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"server_url": "https://sync.example.org"}"#).unwrap();
        assert_eq!(settings.server_url, "https://sync.example.org");
        assert_eq!(settings.tick_interval_secs, 60);
        assert_eq!(settings.max_batch_size, 60);
        assert_eq!(settings.grant_budget_secs, None);
    }

    #[test]
    fn env_overrides_server_token_and_debug_tick() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SERVER_URL, " https://override.example.org "),
            (ENV_AUTH_TOKEN, "secret"),
            (ENV_DEBUG, "true"),
        ]);
        let mut settings = Settings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.server_url, "https://override.example.org");
        assert_eq!(settings.auth_token.as_deref(), Some("secret"));
        assert_eq!(settings.scheduler_config().tick_interval, Duration::from_secs(5));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(|key| (key != ENV_DEBUG).then(|| "  ".to_string()));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn scheduler_config_clamps_degenerate_values() {
        let settings = Settings {
            tick_interval_secs: 0,
            max_batch_size: 0,
            ..Settings::default()
        };
        let config = settings.scheduler_config();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.max_batch_size, 1);
    }

    #[test]
    fn store_writes_defaults_once_and_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert!(store.write_if_missing().unwrap());
        assert!(!store.write_if_missing().unwrap());

        let mut updated = store.file_settings();
        updated.max_batch_size = 10;
        store.update(updated.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.file_settings(), updated);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.file_settings(), Settings::default());
    }
}
