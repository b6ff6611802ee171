//! TOML run configuration
//!
//! Everything is validated up front so a bad config fails before any store
//! is opened or any key material is read.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::encryption::KeySource;
use crate::migrate::{MigrationConfig, DEFAULT_CHECKPOINT_EVERY, DEFAULT_MAX_IN_FLIGHT};
use crate::ops::DEFAULT_MAX_BYTES;
use crate::store::DurabilityLevel;

pub const DEFAULT_CONFIG_FILE: &str = "docferry.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn class(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "ConfigError::Io",
            ConfigError::Parse(_) => "ConfigError::Parse",
            ConfigError::Invalid(_) => "ConfigError::Invalid",
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Operator attestation that nothing writes to the source during the run
    #[serde(default)]
    pub source_writes_frozen: bool,
    pub source: StoreConfig,
    pub destination: StoreConfig,
    #[serde(default)]
    pub pii: PiiConfig,
    pub key: KeyConfig,
    pub migration: MigrationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PiiConfig {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub key_regex: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySourceKind {
    Env,
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub id: String,
    pub source: KeySourceKind,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

impl KeyConfig {
    pub fn key_source(&self) -> Result<KeySource, ConfigError> {
        fn required(value: &Option<String>, name: &str) -> Result<String, ConfigError> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("key.{} is required for this key source", name)))
        }

        match self.source {
            KeySourceKind::Env => Ok(KeySource::Env {
                env_var: required(&self.env_var, "env_var")?,
            }),
            KeySourceKind::File => match &self.path {
                Some(path) if !path.as_os_str().is_empty() => Ok(KeySource::File { path: path.clone() }),
                _ => Err(invalid("key.path is required for this key source")),
            },
            KeySourceKind::Keyring => Ok(KeySource::Keyring {
                service: required(&self.service, "service")?,
                account: required(&self.account, "account")?,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    pub checkpoint_path: PathBuf,
    pub quarantine_dir: PathBuf,
    pub kill_switch_path: PathBuf,
    #[serde(default)]
    pub kill_switch_enabled: bool,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,
    pub durability: String,
    #[serde(default)]
    pub rate_limit_per_second: f64,
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,
    #[serde(default = "default_quarantine_max_bytes")]
    pub quarantine_max_bytes: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_checkpoint_every() -> u64 {
    DEFAULT_CHECKPOINT_EVERY
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("audit")
}

fn default_quarantine_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

impl AppConfig {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = toml::from_str(raw)?;
        config.pii.keys = config
            .pii
            .keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        config.pii.key_regex = config
            .pii
            .key_regex
            .take()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_writes_frozen {
            return Err(invalid(
                "source_writes_frozen must be true: freeze writes to the source before migrating",
            ));
        }

        if self.pii.keys.is_empty() && self.pii.key_regex.is_none() {
            return Err(invalid("pii.keys or pii.key_regex must be set"));
        }
        if let Some(pattern) = &self.pii.key_regex {
            RegexBuilder::new(&format!("^(?:{})$", pattern))
                .case_insensitive(true)
                .build()
                .map_err(|e| invalid(format!("pii.key_regex does not compile: {}", e)))?;
        }

        if self.key.id.trim().is_empty() {
            return Err(invalid("key.id must be set"));
        }
        self.key.key_source()?;

        for (name, path) in [
            ("source.path", &self.source.path),
            ("destination.path", &self.destination.path),
            ("migration.checkpoint_path", &self.migration.checkpoint_path),
            ("migration.quarantine_dir", &self.migration.quarantine_dir),
            ("migration.kill_switch_path", &self.migration.kill_switch_path),
            ("migration.audit_dir", &self.migration.audit_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(invalid(format!("{} must be set", name)));
            }
        }

        if self.migration.max_in_flight == 0 {
            return Err(invalid("migration.max_in_flight must be > 0"));
        }
        if self.migration.quarantine_max_bytes == 0 {
            return Err(invalid("migration.quarantine_max_bytes must be > 0"));
        }
        if !self.migration.rate_limit_per_second.is_finite() {
            return Err(invalid("migration.rate_limit_per_second must be a finite number"));
        }
        self.durability()?;
        Ok(())
    }

    pub fn durability(&self) -> Result<DurabilityLevel, ConfigError> {
        self.migration
            .durability
            .parse()
            .map_err(|e| invalid(format!("migration.durability: {}", e)))
    }

    pub fn migration_config(&self, dry_run_override: bool) -> Result<MigrationConfig, ConfigError> {
        Ok(MigrationConfig {
            max_in_flight: self.migration.max_in_flight,
            checkpoint_every: self.migration.checkpoint_every,
            dry_run: self.migration.dry_run || dry_run_override,
            durability: self.durability()?,
        })
    }

    /// Base64 SHA-256 over the settings that change what a run does
    pub fn checksum(&self, dry_run: bool) -> Result<String, ConfigError> {
        let durability = self.durability()?;
        let fields: [(&str, String); 15] = [
            ("source.path", self.source.path.display().to_string()),
            ("destination.path", self.destination.path.display().to_string()),
            ("pii.keys", self.pii.keys.join(",")),
            ("pii.key_regex", self.pii.key_regex.clone().unwrap_or_default()),
            ("migration.rate_limit_per_second", self.migration.rate_limit_per_second.to_string()),
            ("migration.max_in_flight", self.migration.max_in_flight.to_string()),
            ("migration.checkpoint_every", self.migration.checkpoint_every.to_string()),
            ("migration.checkpoint_path", self.migration.checkpoint_path.display().to_string()),
            ("migration.quarantine_dir", self.migration.quarantine_dir.display().to_string()),
            ("migration.kill_switch_enabled", self.migration.kill_switch_enabled.to_string()),
            ("migration.kill_switch_path", self.migration.kill_switch_path.display().to_string()),
            ("migration.durability", durability.to_string()),
            ("migration.dry_run", dry_run.to_string()),
            ("source_writes_frozen", self.source_writes_frozen.to_string()),
            ("key.id", self.key.id.clone()),
        ];

        let mut hasher = Sha256::new();
        for (name, value) in &fields {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        Ok(BASE64.encode(hasher.finalize()))
    }
}
