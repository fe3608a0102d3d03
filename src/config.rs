use crate::holidays::providers::{FEIERTAGE_API_URL, FERIEN_API_URL, NAGER_URL, OPENHOLIDAYS_URL};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const CONFIG_ENV: &str = "WEEKPLAN_CONFIG";
pub const DATA_DIR_ENV: &str = "WEEKPLAN_DATA_DIR";
pub const BACKEND_ENV: &str = "WEEKPLAN_BACKEND";
pub const HTTP_ADDR_ENV: &str = "WEEKPLAN_HTTP_ADDR";
pub const SAVE_DEBOUNCE_ENV: &str = "WEEKPLAN_SAVE_DEBOUNCE_MS";
pub const OFFLINE_ENV: &str = "WEEKPLAN_OFFLINE";

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::File => f.write_str("file"),
            StorageBackend::Sqlite => f.write_str("sqlite"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(StorageBackend::File),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(other.to_string()),
        }
    }
}

/// Base URLs of the remote holiday providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub openholidays_url: String,
    pub ferien_api_url: String,
    pub feiertage_api_url: String,
    pub nager_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openholidays_url: OPENHOLIDAYS_URL.to_string(),
            ferien_api_url: FERIEN_API_URL.to_string(),
            feiertage_api_url: FEIERTAGE_API_URL.to_string(),
            nager_url: NAGER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub data_dir: PathBuf,
    pub backend: StorageBackend,
    pub http_addr: String,
    pub save_debounce_ms: u64,
    /// Skip remote holiday providers; only the embedded table and caches are used.
    pub offline: bool,
    pub providers: ProviderConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: StorageBackend::default(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            offline: false,
            providers: ProviderConfig::default(),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("weekplan"))
        .unwrap_or_else(|| PathBuf::from("weekplan-data"))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("weekplan").join("config.toml"))
}

impl PlannerConfig {
    /// Defaults, then the config file, then `WEEKPLAN_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Same as [`PlannerConfig::load`] with an injectable environment.
    pub fn resolve<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = env(CONFIG_ENV).filter(|path| !path.trim().is_empty());
        let mut config = match explicit {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(env)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|value| !value.trim().is_empty());
        if let Some(dir) = var(DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = var(BACKEND_ENV) {
            self.backend = backend
                .parse()
                .map_err(|value| invalid(BACKEND_ENV, value))?;
        }
        if let Some(addr) = var(HTTP_ADDR_ENV) {
            self.http_addr = addr;
        }
        if let Some(ms) = var(SAVE_DEBOUNCE_ENV) {
            self.save_debounce_ms = ms
                .trim()
                .parse()
                .map_err(|_| invalid(SAVE_DEBOUNCE_ENV, ms.clone()))?;
        }
        if let Some(flag) = var(OFFLINE_ENV) {
            self.offline = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(OFFLINE_ENV, flag)),
            };
        }
        Ok(())
    }
}

fn invalid(key: &str, value: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    }
}
