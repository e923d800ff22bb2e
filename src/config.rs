//! Client configuration
//!
//! Loaded from a TOML file, then environment overrides are applied on top.
//! CLI flags are applied last by the binary.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use typelens_core::{AnalysisSettings, CredentialField, DatabaseKind, LimitChange, SettingsError};

use crate::channel::ReconnectPolicy;
use crate::logging::LoggingConfig;

/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "typelens.toml";
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3001";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid analysis settings: {0}")]
    Settings(#[from] SettingsError),
}

/// Full client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub connect_timeout_secs: u64,
    /// A run with no inbound event for this long is failed
    pub silence_timeout_secs: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout_secs: 10,
            silence_timeout_secs: 120,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_secs(self.silence_timeout_secs)
    }
}

/// `[server.reconnect]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// `[analysis]` section: initial values of the settings store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_row_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_kind: Option<String>,
    /// Credential fields per database kind, e.g. `[analysis.credentials.postgres]`
    pub credentials: BTreeMap<String, BTreeMap<String, String>>,
}

impl AnalysisConfig {
    /// Build the settings store these values describe
    pub fn settings(&self) -> Result<AnalysisSettings, ConfigError> {
        let mut settings = AnalysisSettings::new();
        if let Some(limit) = self.sample_row_limit {
            settings.set_sample_row_limit(LimitChange::Override(limit));
        }

        for (kind, fields) in &self.credentials {
            settings.set_database_kind(kind.parse()?);
            for (name, value) in fields {
                settings.set_credential_field(name, value.clone())?;
            }
        }

        let kind = match self.database_kind.as_deref() {
            Some(kind) => kind.parse()?,
            None => DatabaseKind::Unset,
        };
        settings.set_database_kind(kind);
        Ok(settings)
    }
}

impl ClientConfig {
    /// Load from `path`, or from `DEFAULT_CONFIG_FILE` when none is given,
    /// then apply environment overrides
    ///
    /// A missing default file means defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = match fs::read_to_string(&path) {
            Ok(text) => {
                let config = Self::from_toml(&text)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) if e.kind() == ErrorKind::NotFound && !explicit => {
                debug!("No configuration at {:?}, using defaults", path);
                Self::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse and check a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(text)?;
        config.analysis.settings()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `TYPELENS_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TYPELENS_SERVER_URL") {
            self.server.url = url;
            debug!("Applied env override for server url");
        }

        if let Some(value) = lookup("TYPELENS_SILENCE_TIMEOUT_SECS") {
            self.server.silence_timeout_secs =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "TYPELENS_SILENCE_TIMEOUT_SECS",
                    value: value.clone(),
                })?;
            debug!("Applied env override for silence timeout");
        }

        if let Some(level) = lookup("TYPELENS_LOG_LEVEL") {
            self.logging.level = level;
            debug!("Applied env override for log level");
        }

        if let Some(kind) = lookup("TYPELENS_DB_KIND") {
            if kind.parse::<DatabaseKind>().is_err() {
                return Err(ConfigError::InvalidEnv {
                    var: "TYPELENS_DB_KIND",
                    value: kind,
                });
            }
            self.analysis.database_kind = Some(kind);
            debug!("Applied env override for database kind");
        }

        Ok(())
    }

    /// Copy with secret credential values masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for fields in copy.analysis.credentials.values_mut() {
            for (name, value) in fields.iter_mut() {
                let secret = name
                    .parse::<CredentialField>()
                    .map(|f| f.is_secret())
                    .unwrap_or(false);
                if secret {
                    *value = "***".to_string();
                }
            }
        }
        copy
    }
}
