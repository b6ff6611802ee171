use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use docferry_lib::config::AppConfig;
use docferry_lib::encryption::{load_key, FieldCipher};
use docferry_lib::migrate::MigrationJob;
use docferry_lib::ops::{CheckpointStore, KillSwitch, QuarantineWriter, RateLimiter};
use docferry_lib::pii::PiiScanner;
use docferry_lib::store::DirectoryStore;

/// Validated configuration plus the components built from it
pub struct App {
    pub config: AppConfig,
}

impl App {
    /// Load and validate the config. Touches no store and no key material.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = AppConfig::load(config_path)?;
        Ok(Self { config })
    }

    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.config.migration.checkpoint_path)
    }

    pub fn kill_switch(&self) -> KillSwitch {
        let settings = &self.config.migration;
        KillSwitch::new(&settings.kill_switch_path, settings.kill_switch_enabled)
    }

    pub fn scanner(&self) -> Result<PiiScanner> {
        let source = self.config.key.key_source()?;
        let key = load_key(&source).context("Failed to load field key")?;
        let cipher = FieldCipher::new(key, self.config.key.id.trim())?;
        let scanner = PiiScanner::new(cipher, &self.config.pii.keys, self.config.pii.key_regex.as_deref())?;
        Ok(scanner)
    }

    pub fn migration_job(&self, dry_run_override: bool) -> Result<MigrationJob> {
        let settings = &self.config.migration;
        let scanner = self.scanner()?;
        let limiter = RateLimiter::new(settings.rate_limit_per_second)?;
        let quarantine = QuarantineWriter::with_max_bytes(&settings.quarantine_dir, settings.quarantine_max_bytes)?;
        let kill_switch = self.kill_switch();

        let job = MigrationJob::new(
            Arc::new(DirectoryStore::new(&self.config.source.path)),
            Arc::new(DirectoryStore::new(&self.config.destination.path)),
            scanner,
            limiter,
            self.checkpoint_store(),
            quarantine,
            kill_switch,
            self.config.migration_config(dry_run_override)?,
        )?;
        Ok(job)
    }
}
