//! TOML-based application configuration.
//!
//! Stores:
//! - Engine timing (poll, watchdog and heartbeat periods)
//! - Defaults for newly created timers
//! - Notification preferences
//!
//! Configuration is stored at `~/.config/multitimer/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::timer::{IntervalSequence, RestorePolicy, TimerConfig, DEFAULT_PROJECT_COLOR};

/// Engine timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Foreground poll period.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_ms: u64,
    /// A running timer with no accepted tick for this long gets a forced one.
    #[serde(default = "default_stale_after")]
    pub stale_after_ms: u64,
    #[serde(default = "default_true")]
    pub use_background_clock: bool,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Silence longer than this disables the background clock.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,
    /// How a timer saved while running resumes on load.
    #[serde(default = "default_restore_policy")]
    pub restore_policy: RestorePolicy,
}

/// Defaults applied to newly created timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_color")]
    pub project_color: String,
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u64,
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u64,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/multitimer/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_tick_interval() -> u64 {
    100
}
fn default_watchdog_interval() -> u64 {
    1000
}
fn default_stale_after() -> u64 {
    2000
}
fn default_heartbeat_interval() -> u64 {
    5000
}
fn default_heartbeat_timeout() -> u64 {
    15_000
}
fn default_restore_policy() -> RestorePolicy {
    RestorePolicy::ReplayElapsed
}
fn default_color() -> String {
    DEFAULT_PROJECT_COLOR.into()
}
fn default_work_minutes() -> u64 {
    25
}
fn default_break_minutes() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            watchdog_interval_ms: default_watchdog_interval(),
            stale_after_ms: default_stale_after(),
            use_background_clock: true,
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
            restore_policy: default_restore_policy(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            project_color: default_color(),
            work_minutes: default_work_minutes(),
            break_minutes: default_break_minutes(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => value
                        .parse::<bool>()
                        .map(serde_json::Value::Bool)
                        .map_err(|e| invalid(e.to_string()))?,
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(unknown());
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `config.toml` inside the data directory.
    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults if no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
                .into()
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a leaf value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// All leaf keys with their current values, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let Ok(serde_json::Value::Object(sections)) = serde_json::to_value(self) else {
            return out;
        };
        for (section, values) in sections {
            if let serde_json::Value::Object(values) = values {
                for (name, value) in values {
                    let rendered = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    out.push((format!("{section}.{name}"), rendered));
                }
            }
        }
        out
    }

    /// Timer configuration seeded from `[defaults]`.
    pub fn timer_defaults(&self) -> TimerConfig {
        TimerConfig {
            project_color: self.defaults.project_color.clone(),
            intervals: IntervalSequence::with_minutes(
                self.defaults.work_minutes,
                self.defaults.break_minutes,
            ),
            ..TimerConfig::default()
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.engine.tick_interval_ms, 100);
        assert_eq!(parsed.engine.restore_policy, RestorePolicy::ReplayElapsed);
        assert_eq!(parsed.defaults.project_color, DEFAULT_PROJECT_COLOR);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[engine]\nstale_after_ms = 5000\n").unwrap();
        assert_eq!(parsed.engine.stale_after_ms, 5000);
        assert_eq!(parsed.engine.watchdog_interval_ms, 1000);
        assert!(parsed.notifications.enabled);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("engine.use_background_clock").as_deref(), Some("true"));
        assert_eq!(cfg.get("defaults.work_minutes").as_deref(), Some("25"));
        assert_eq!(cfg.get("engine.restore_policy").as_deref(), Some("replay_elapsed"));
        assert!(cfg.get("engine.missing_key").is_none());
        assert!(cfg.get("engine").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("engine.heartbeat_timeout_ms", "30000").unwrap();
        cfg.set("notifications.enabled", "false").unwrap();
        cfg.set("engine.restore_policy", "restart_clock").unwrap();
        cfg.set("defaults.project_color", "#FF5733").unwrap();
        assert_eq!(cfg.engine.heartbeat_timeout_ms, 30_000);
        assert!(!cfg.notifications.enabled);
        assert_eq!(cfg.engine.restore_policy, RestorePolicy::RestartClock);
        assert_eq!(cfg.defaults.project_color, "#FF5733");
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("engine.nonexistent", "1"),
            Err(crate::CoreError::Config(ConfigError::UnknownKey(_)))
        ));
        assert!(cfg.set("engine", "1").is_err());
        assert!(cfg.set("notifications.enabled", "maybe").is_err());
        assert!(cfg.set("engine.tick_interval_ms", "-5").is_err());
        assert!(cfg.set("engine.restore_policy", "rewind").is_err());
        assert_eq!(cfg.engine.restore_policy, RestorePolicy::ReplayElapsed);
    }

    #[test]
    fn entries_list_every_leaf() {
        let keys: Vec<_> = Config::default()
            .entries()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert!(keys.contains(&"engine.tick_interval_ms".to_string()));
        assert!(keys.contains(&"defaults.break_minutes".to_string()));
        assert!(keys.contains(&"notifications.enabled".to_string()));
        assert_eq!(keys.len(), 11);
    }

    #[test]
    fn load_from_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.defaults.work_minutes, 25);

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn timer_defaults_follow_config() {
        let mut cfg = Config::default();
        cfg.defaults.work_minutes = 50;
        cfg.defaults.break_minutes = 10;
        let timer = cfg.timer_defaults();
        assert_eq!(timer.intervals.cycle_secs(), 60 * 60);
        assert!(timer.auto_advance);
    }
}
