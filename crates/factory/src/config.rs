//! Configuration for the factory
//!
//! Loaded from `config.toml`. Lookup order: explicit path, `$FACTORY_CONFIG`,
//! `<config_dir>/factory/config.toml`, then built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::plan::OrderingPolicy;

pub const CONFIG_ENV: &str = "FACTORY_CONFIG";
pub const DATABASE_URL_ENV: &str = "FACTORY_DATABASE_URL";
pub const SANDBOX_TIMEOUT_ENV: &str = "FACTORY_SANDBOX_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub ordering: OrderingPolicy,

    #[serde(default)]
    pub process_sandbox: ProcessSandboxConfig,

    #[serde(default)]
    pub browser_sandbox: BrowserSandboxConfig,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_database_url() -> String {
    "sqlite://factory.db".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            ordering: OrderingPolicy::default(),
            process_sandbox: ProcessSandboxConfig::default(),
            browser_sandbox: BrowserSandboxConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSandboxConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_python_bin")]
    pub python_bin: String,

    #[serde(default = "default_node_bin")]
    pub node_bin: String,

    #[serde(default = "default_bash_bin")]
    pub bash_bin: String,

    /// Scratch directory root; the system temp dir when unset
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_node_bin() -> String {
    "node".to_string()
}

fn default_bash_bin() -> String {
    "bash".to_string()
}

impl Default for ProcessSandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            python_bin: default_python_bin(),
            node_bin: default_node_bin(),
            bash_bin: default_bash_bin(),
            work_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSandboxConfig {
    #[serde(default = "default_site_root")]
    pub root_dir: PathBuf,

    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_site_root() -> PathBuf {
    std::env::temp_dir().join("factory-sites")
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for BrowserSandboxConfig {
    fn default() -> Self {
        Self {
            root_dir: default_site_root(),
            base_url: default_base_url(),
        }
    }
}

impl FactoryConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("factory").join("config.toml"))
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve and load configuration, then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| Self::default_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `FACTORY_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV) {
            self.database_url = url;
        }
        if let Some(raw) = lookup(SANDBOX_TIMEOUT_ENV) {
            self.process_sandbox.timeout_secs =
                raw.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                    key: SANDBOX_TIMEOUT_ENV.to_string(),
                    value: raw.clone(),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: FactoryConfig = toml::from_str("").unwrap();
        assert_eq!(config.database_url, "sqlite://factory.db");
        assert_eq!(config.ordering, OrderingPolicy::Validate);
        assert_eq!(config.process_sandbox.timeout_secs, 120);
        assert_eq!(config.event_channel_capacity, 1000);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ordering = "sort"

[process_sandbox]
timeout_secs = 5
python_bin = "python3.12"

[browser_sandbox]
base_url = "http://preview.local"
"#
        )
        .unwrap();

        let config = FactoryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ordering, OrderingPolicy::Sort);
        assert_eq!(config.process_sandbox.timeout_secs, 5);
        assert_eq!(config.process_sandbox.python_bin, "python3.12");
        assert_eq!(config.process_sandbox.node_bin, "node");
        assert_eq!(config.browser_sandbox.base_url, "http://preview.local");
    }

    #[test]
    fn test_bad_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ordering = 42").unwrap();
        let err = FactoryConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FactoryConfig::default();
        config
            .apply_overrides(|key| match key {
                DATABASE_URL_ENV => Some("sqlite::memory:".to_string()),
                SANDBOX_TIMEOUT_ENV => Some("7".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.process_sandbox.timeout_secs, 7);

        let err = config
            .apply_overrides(|key| (key == SANDBOX_TIMEOUT_ENV).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }
}
