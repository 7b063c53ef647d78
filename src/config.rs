// src/config.rs

//! Application configuration.
//!
//! Stored as `config.json` in the project config directory. The file also
//! carries the credentials that modules declare through
//! `required_capabilities`, keyed by module name.

use crate::core::module::{ModuleContext, ModuleDescriptor};
use crate::logging::{get_config_dir, get_data_dir};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound for concurrent sockets opened by the probe engine.
pub const MAX_PROBE_CONCURRENCY: usize = 128;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("failed to write config {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_concurrency: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1500,
            read_timeout_ms: 3000,
            max_concurrency: 32,
        }
    }
}

impl ProbeSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Concurrency clamped to `1..=MAX_PROBE_CONCURRENCY`.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_PROBE_CONCURRENCY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("VanguardRecon/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub probe: ProbeSettings,
    pub http: HttpSettings,
    pub session_dir: Option<PathBuf>,
    /// module name -> credential name -> secret
    pub credentials: HashMap<String, HashMap<String, String>>,
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        get_config_dir().join(CONFIG_FILE)
    }

    /// Loads the config at `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file found, using defaults.");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Configuration loaded.");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(path, json).map_err(write_err)?;
        info!(path = %path.display(), "Configuration saved.");
        Ok(())
    }

    pub fn session_dir(&self) -> PathBuf {
        self.session_dir
            .clone()
            .unwrap_or_else(|| get_data_dir().join("sessions"))
    }

    /// Required credential names of `descriptor` that have no stored value.
    pub fn missing_credentials(&self, descriptor: &ModuleDescriptor) -> Vec<&'static str> {
        let stored = self.credentials.get(descriptor.name);
        descriptor
            .required_capabilities
            .iter()
            .copied()
            .filter(|name| {
                stored
                    .and_then(|secrets| secrets.get(*name))
                    .is_none_or(|value| value.is_empty())
            })
            .collect()
    }

    pub fn set_credential(&mut self, module: &str, name: &str, value: impl Into<String>) {
        self.credentials
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string(), value.into());
    }

    /// Snapshot handed to modules for one run.
    pub fn module_context(&self) -> ModuleContext {
        ModuleContext::new(self.probe.clone(), self.http.clone(), self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYED: ModuleDescriptor =
        ModuleDescriptor::new("Reverse IP Lookup", "").requiring(&["SecurityTrails_API_Key"]);

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = AppConfig::default();
        config.probe.max_concurrency = 8;
        config.set_credential("Reverse IP Lookup", "SecurityTrails_API_Key", "secret");
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "probe": { "max_concurrency": 4 } }"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.probe.max_concurrency, 4);
        assert_eq!(config.probe.connect_timeout_ms, ProbeSettings::default().connect_timeout_ms);
        assert_eq!(config.http, HttpSettings::default());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn concurrency_is_clamped() {
        let mut probe = ProbeSettings { max_concurrency: 0, ..Default::default() };
        assert_eq!(probe.concurrency(), 1);
        probe.max_concurrency = 10_000;
        assert_eq!(probe.concurrency(), MAX_PROBE_CONCURRENCY);
    }

    #[test]
    fn reports_missing_credentials() {
        let mut config = AppConfig::default();
        assert_eq!(config.missing_credentials(&KEYED), vec!["SecurityTrails_API_Key"]);

        config.set_credential("Reverse IP Lookup", "SecurityTrails_API_Key", "");
        assert_eq!(config.missing_credentials(&KEYED), vec!["SecurityTrails_API_Key"]);

        config.set_credential("Reverse IP Lookup", "SecurityTrails_API_Key", "k");
        assert!(config.missing_credentials(&KEYED).is_empty());
    }
}
