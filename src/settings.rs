use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::monitor::{AlertThresholds, RearmPolicy};

const MIN_CAPTURE_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub tick_interval_secs: u64,
    pub capture_interval_ms: u64,
    pub warn_after_ticks: u32,
    pub escalate_after_ticks: u32,
    pub rearm: RearmPolicy,
    pub chime_enabled: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            capture_interval_ms: 500,
            warn_after_ticks: 5,
            escalate_after_ticks: 5,
            rearm: RearmPolicy::AtEscalation,
            chime_enabled: true,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            bail!("tickIntervalSecs must be at least 1");
        }
        if self.capture_interval_ms < MIN_CAPTURE_INTERVAL_MS {
            bail!("captureIntervalMs must be at least {MIN_CAPTURE_INTERVAL_MS}");
        }
        self.thresholds().validate()
    }

    pub fn thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            warn_after_ticks: self.warn_after_ticks,
            escalate_after_ticks: self.escalate_after_ticks,
            rearm: self.rearm,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiToken {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub bind: String,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub api_tokens: Vec<ApiToken>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".into(),
            allowed_origins: Vec::new(),
            api_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub server: ServerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: Settings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring malformed settings at {}: {err}; using defaults",
                    path.display()
                );
                Settings::default()
            })
        } else {
            Settings::default()
        };

        if let Err(err) = data.monitor.validate() {
            warn!(
                "Ignoring invalid monitor settings at {}: {err}; using defaults",
                path.display()
            );
            data.monitor = MonitorSettings::default();
        }

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> Settings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn monitor(&self) -> MonitorSettings {
        self.settings().monitor
    }

    pub fn server(&self) -> ServerSettings {
        self.settings().server
    }

    pub fn update_monitor(&self, monitor: MonitorSettings) -> Result<()> {
        monitor.validate()?;
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.monitor = monitor;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.settings(), Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"monitor": {"warnAfterTicks": 8, "rearm": "afterEveryAlert"}}"#).unwrap();

        let monitor = SettingsStore::new(path).unwrap().monitor();

        assert_eq!(monitor.warn_after_ticks, 8);
        assert_eq!(monitor.escalate_after_ticks, 5);
        assert_eq!(monitor.rearm, RearmPolicy::AfterEveryAlert);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        assert_eq!(SettingsStore::new(path).unwrap().settings(), Settings::default());
    }

    #[test]
    fn out_of_range_monitor_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"monitor": {"warnAfterTicks": 0}, "server": {"bind": "0.0.0.0:8080"}}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();

        assert_eq!(settings.monitor, MonitorSettings::default());
        assert_eq!(settings.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn updates_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut monitor = store.monitor();
        monitor.escalate_after_ticks = 12;
        store.update_monitor(monitor).unwrap();

        assert_eq!(SettingsStore::new(path).unwrap().monitor().escalate_after_ticks, 12);
    }

    #[test]
    fn invalid_monitor_settings_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        let mut monitor = store.monitor();
        monitor.escalate_after_ticks = 0;
        assert!(store.update_monitor(monitor).is_err());

        let mut monitor = store.monitor();
        monitor.tick_interval_secs = 0;
        assert!(store.update_monitor(monitor).is_err());
    }
}
