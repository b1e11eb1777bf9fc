use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PdfSettings {
    /// Base URL of the table-extraction service; `/parse` is appended.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl PdfSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuleSettings {
    pub ttl_secs: u64,
    /// Use the previous snapshot when a refresh fails instead of failing the call.
    pub serve_stale_on_error: bool,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            serve_stale_on_error: false,
        }
    }
}

impl RuleSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadSettings {
    pub max_size_bytes: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub database_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub pdf: PdfSettings,
    pub rules: RuleSettings,
    pub upload: UploadSettings,
    pub storage: StorageSettings,
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path` if given, then applies `CASHLENS_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(p) => Self::from_toml(&std::fs::read_to_string(p)?)?,
            None => Settings::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Applies overrides from `lookup`, normally the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CASHLENS_PDF_ENDPOINT") {
            self.pdf.endpoint = v;
        }
        if let Some(v) = lookup("CASHLENS_PDF_TIMEOUT_SECS") {
            self.pdf.timeout_secs = parse_u64("CASHLENS_PDF_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("CASHLENS_RULE_TTL_SECS") {
            self.rules.ttl_secs = parse_u64("CASHLENS_RULE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("CASHLENS_DATABASE_URL") {
            self.storage.database_url = v;
        }
        Ok(())
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
