//! Configuration loading and validation for the record service.
//!
//! All values are read from environment variables at startup. The process
//! exits with a clear error message if any value is invalid.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::key::KeySource;

/// Validated record service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Base64 key; takes precedence over the key file when set.
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Path of the key file (one line of base64).
    #[serde(default = "default_key_file")]
    pub encryption_key_file: String,

    /// Optional JSON entity catalog replacing the built-in one.
    #[serde(default)]
    pub entity_catalog_path: Option<String>,

    /// HTTP header naming the entity type of each request.
    #[serde(default = "default_entity_header")]
    pub entity_header_name: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

pub fn default_key_file() -> String {
    "data/.encryption_key".into()
}
fn default_entity_header() -> String {
    "X-Entity-Type".into()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

// Hand-written so the key never reaches logs through `{:?}`.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("encryption_key_file", &self.encryption_key_file)
            .field("entity_catalog_path", &self.entity_catalog_path)
            .field("entity_header_name", &self.entity_header_name)
            .field("listen_port", &self.listen_port)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.encryption_key_file.trim().is_empty() {
            anyhow::bail!("ENCRYPTION_KEY_FILE must not be empty");
        }
        if self.entity_header_name.trim().is_empty() {
            anyhow::bail!("ENTITY_HEADER_NAME must not be empty");
        }
        if axum::http::HeaderName::from_bytes(self.entity_header_name.as_bytes()).is_err() {
            anyhow::bail!(
                "ENTITY_HEADER_NAME {:?} is not a valid HTTP header name",
                self.entity_header_name
            );
        }
        Ok(())
    }

    /// Key source in precedence order: environment value, then key file.
    pub fn key_source(&self) -> KeySource {
        KeySource {
            env_key: self.encryption_key.clone(),
            key_file: PathBuf::from(&self.encryption_key_file),
        }
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.entity_catalog_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }
}
