//! Configuration loaded from an optional JSON file plus `TFE_*` environment
//! overrides.

use crate::shared::logging;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ADDRESS: &str = "https://app.terraform.io";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub server: ServerConfig,
}

/// Connection settings for the Terraform Enterprise / HCP Terraform API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub address: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub skip_tls_verify: bool,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            token: None,
            skip_tls_verify: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported to MCP clients
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "tfemcp".to_string(),
        }
    }
}

impl Config {
    /// Apply `TFE_ADDRESS`, `TFE_TOKEN` and `TFE_SKIP_TLS_VERIFY`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(address) = lookup("TFE_ADDRESS").filter(|v| !v.trim().is_empty()) {
            self.backend.address = address.trim().to_string();
        }
        if let Some(token) = lookup("TFE_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.backend.token = Some(token.trim().to_string());
        }
        if let Some(skip) = lookup("TFE_SKIP_TLS_VERIFY") {
            self.backend.skip_tls_verify = matches!(skip.to_lowercase().as_str(), "true" | "1");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.backend.address).map_err(|e| {
            ConfigError::Invalid(format!(
                "backend address '{}' is not a valid URL: {}",
                self.backend.address, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "backend address '{}' must use http or https",
                self.backend.address
            )));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_token(&self) -> bool {
        self.backend.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// `$XDG_CONFIG_HOME/tfemcp/config.json` (or the platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tfemcp").join("config.json"))
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the given config file, then apply environment overrides.
pub fn init_from_path(path: &Path) -> Result<Config, ConfigError> {
    logging::info(&format!("Loading configuration from {}", path.display()));
    let mut config = read_file(path)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Load the default config file when present, then apply environment
/// overrides.
pub fn init_default() -> Result<Config, ConfigError> {
    let mut config = match default_config_path().filter(|p| p.exists()) {
        Some(path) => {
            logging::info(&format!("Loading configuration from {}", path.display()));
            read_file(&path)?
        }
        None => {
            logging::debug("No config file found, using defaults");
            Config::default()
        }
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend.address, DEFAULT_ADDRESS);
        assert!(!config.has_token());
        assert_eq!(config.server.name, "tfemcp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("TFE_ADDRESS", "https://tfe.example.com"),
            ("TFE_TOKEN", " secret "),
            ("TFE_SKIP_TLS_VERIFY", "TRUE"),
        ]));
        assert_eq!(config.backend.address, "https://tfe.example.com");
        assert_eq!(config.backend.token.as_deref(), Some("secret"));
        assert!(config.backend.skip_tls_verify);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("TFE_ADDRESS", ""), ("TFE_TOKEN", "  ")]));
        assert_eq!(config.backend.address, DEFAULT_ADDRESS);
        assert!(config.backend.token.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"backend": {{"address": "https://tfe.internal", "timeout_secs": 10}}}}"#
        )
        .unwrap();

        let config = read_file(file.path()).unwrap();
        assert_eq!(config.backend.address, "https://tfe.internal");
        assert_eq!(config.backend.timeout_secs, 10);
        assert!(!config.backend.skip_tls_verify);
        assert_eq!(config.server.name, "tfemcp");
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = read_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let mut config = Config::default();
        config.backend.address = "ftp://tfe.example.com".to_string();
        assert!(config.validate().is_err());
        config.backend.address = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_is_never_exposed() {
        let mut config = Config::default();
        config.backend.token = Some("super-secret".to_string());
        assert!(!format!("{:?}", config).contains("super-secret"));
        assert!(!serde_json::to_string(&config).unwrap().contains("super-secret"));
    }
}
