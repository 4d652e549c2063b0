//! Operator CLI configuration, read from the same environment as the service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use fieldcrypt::config::default_key_file;
use fieldcrypt::key::KeySource;
use serde::Deserialize;

use crate::backup::DEFAULT_RETENTION;

#[derive(Clone, Deserialize)]
pub struct Config {
    /// Set only to warn: the CLI always works on the key file.
    #[serde(default)]
    pub encryption_key: Option<String>,

    #[serde(default = "default_key_file")]
    pub encryption_key_file: String,

    #[serde(default = "default_backup_dir")]
    pub key_backup_dir: String,

    /// Snapshots kept after each backup.
    #[serde(default = "default_retention")]
    pub key_backup_retention: usize,

    #[serde(default = "default_store_path")]
    pub document_store_path: String,

    #[serde(default)]
    pub entity_catalog_path: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_backup_dir() -> String {
    "data/key-backups".into()
}
fn default_retention() -> usize {
    DEFAULT_RETENTION
}
fn default_store_path() -> String {
    "data/db.json".into()
}
fn default_log_level() -> String {
    "warn".into()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("encryption_key_file", &self.encryption_key_file)
            .field("key_backup_dir", &self.key_backup_dir)
            .field("key_backup_retention", &self.key_backup_retention)
            .field("document_store_path", &self.document_store_path)
            .field("entity_catalog_path", &self.entity_catalog_path)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
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
        if self.key_backup_dir.trim().is_empty() {
            anyhow::bail!("KEY_BACKUP_DIR must not be empty");
        }
        if self.key_backup_retention == 0 {
            anyhow::bail!("KEY_BACKUP_RETENTION must be greater than zero");
        }
        Ok(())
    }

    /// `true` when `ENCRYPTION_KEY` is set and would shadow the key file at runtime.
    pub fn env_key_overrides_file(&self) -> bool {
        self.encryption_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    pub fn key_file(&self) -> PathBuf {
        PathBuf::from(&self.encryption_key_file)
    }

    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.key_backup_dir)
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.document_store_path)
    }

    /// Same precedence the service uses, for commands that encrypt.
    pub fn key_source(&self) -> KeySource {
        KeySource {
            env_key: self.encryption_key.clone(),
            key_file: self.key_file(),
        }
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.entity_catalog_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }
}
