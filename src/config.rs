//! Logger configuration
//!
//! Settings come from JSON files and `EXECLOG_*` environment variables.
//! Files are layered: for each field the first file that sets it wins, and
//! the environment overrides every file. Missing files are skipped.
//!
//! ```json
//! { "data_path": "/var/lib/app/execlog.sqlite3", "store_logs": true, "log_level": "info" }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::level::MessageLevel;
use crate::store::{SqliteLogStore, StoreError};

pub const ENV_DATA_PATH: &str = "EXECLOG_DATA_PATH";
pub const ENV_STORE_LOGS: &str = "EXECLOG_STORE_LOGS";
pub const ENV_LOG_LEVEL: &str = "EXECLOG_LOG_LEVEL";

/// Resolved logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// SQLite database holding executions and their logs
    pub data_path: PathBuf,
    /// When false, logs go to a throwaway in-memory database
    pub store_logs: bool,
    /// Minimum level echoed to the console and default tracing filter
    pub log_level: MessageLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("execlog.sqlite3"),
            store_logs: true,
            log_level: MessageLevel::Warning,
        }
    }
}

/// One configuration layer as read from disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfigFile {
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    #[serde(default)]
    pub store_logs: Option<bool>,
    #[serde(default)]
    pub log_level: Option<MessageLevel>,
}

impl LogConfigFile {
    /// Read one layer; `Ok(None)` if the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let layer = serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(Some(layer))
    }

    /// Fill fields not yet set from `lower`.
    fn merge(self, lower: LogConfigFile) -> Self {
        Self {
            data_path: self.data_path.or(lower.data_path),
            store_logs: self.store_logs.or(lower.store_logs),
            log_level: self.log_level.or(lower.log_level),
        }
    }
}

impl LogConfig {
    /// Load from config files (highest priority first), then the process
    /// environment.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        Self::load_with_env(paths, |key| std::env::var(key).ok())
    }

    /// Same as [`LogConfig::load`] with an explicit environment lookup.
    pub fn load_with_env<F>(paths: &[PathBuf], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = LogConfigFile::default();
        for path in paths {
            if let Some(layer) = LogConfigFile::read(path)? {
                tracing::debug!(path = %path.display(), "loaded config layer");
                merged = merged.merge(layer);
            }
        }

        let mut config = Self::from_file(merged);
        config.apply_env(env)?;
        Ok(config)
    }

    fn from_file(file: LogConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            data_path: file.data_path.unwrap_or(defaults.data_path),
            store_logs: file.store_logs.unwrap_or(defaults.store_logs),
            log_level: file.log_level.unwrap_or(defaults.log_level),
        }
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = env(ENV_DATA_PATH) {
            self.data_path = PathBuf::from(path);
        }
        if let Some(value) = env(ENV_STORE_LOGS) {
            self.store_logs =
                parse_bool(&value).with_context(|| format!("invalid {}", ENV_STORE_LOGS))?;
        }
        if let Some(value) = env(ENV_LOG_LEVEL) {
            self.log_level = value
                .parse()
                .with_context(|| format!("invalid {}", ENV_LOG_LEVEL))?;
        }
        Ok(())
    }

    /// Open the configured store.
    pub fn open_store(&self) -> Result<SqliteLogStore, StoreError> {
        if self.store_logs {
            SqliteLogStore::open(&self.data_path)
        } else {
            SqliteLogStore::open_in_memory()
        }
    }

    /// Install the global `tracing` subscriber.
    ///
    /// `RUST_LOG` takes precedence over `log_level`. Returns `false` when a
    /// subscriber was already installed.
    pub fn init_tracing(&self) -> Result<bool> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.log_level.as_str()))
            .context("invalid tracing filter")?;

        Ok(tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");

        let config = LogConfig::load_with_env(&[missing], no_env).unwrap();
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_first_layer_wins_per_field() {
        let dir = tempdir().unwrap();
        let user = dir.path().join("user.json");
        let system = dir.path().join("system.json");
        std::fs::write(&user, r#"{ "log_level": "debug" }"#).unwrap();
        std::fs::write(
            &system,
            r#"{ "log_level": "error", "data_path": "/srv/log.sqlite3", "store_logs": false }"#,
        )
        .unwrap();

        let config = LogConfig::load_with_env(&[user, system], no_env).unwrap();
        assert_eq!(config.log_level, MessageLevel::Debug);
        assert_eq!(config.data_path, PathBuf::from("/srv/log.sqlite3"));
        assert!(!config.store_logs);
    }

    #[test]
    fn test_env_overrides_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, r#"{ "store_logs": false, "log_level": "warn" }"#).unwrap();

        let env: HashMap<&str, &str> = [(ENV_STORE_LOGS, "yes"), (ENV_LOG_LEVEL, "Information")]
            .into_iter()
            .collect();
        let config =
            LogConfig::load_with_env(&[file], |key| env.get(key).map(|v| v.to_string())).unwrap();
        assert!(config.store_logs);
        assert_eq!(config.log_level, MessageLevel::Information);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, r#"{ "colour": "blue" }"#).unwrap();
        let err = LogConfig::load_with_env(&[file.clone()], no_env).unwrap_err();
        assert!(err.to_string().contains("invalid config file"));

        std::fs::write(&file, "{}").unwrap();
        let err = LogConfig::load_with_env(&[file], |key| {
            (key == ENV_STORE_LOGS).then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(format!("{:#}", err).contains("expected a boolean"));
    }

    #[tokio::test]
    async fn test_open_store_respects_store_logs() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            data_path: dir.path().join("db").join("execlog.sqlite3"),
            store_logs: false,
            log_level: MessageLevel::Warning,
        };
        let store = config.open_store().unwrap();
        assert_eq!(store.path(), ":memory:");
        assert!(!config.data_path.exists());

        let durable = LogConfig {
            store_logs: true,
            ..config.clone()
        };
        durable.open_store().unwrap();
        assert!(durable.data_path.exists());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = LogConfig::default();
        let _ = config.init_tracing().unwrap();
        assert!(!config.init_tracing().unwrap());
    }
}
