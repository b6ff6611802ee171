use std::path::Path;

use anyhow::{Context, Result};

use docferry_lib::audit::AuditRecord;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(config_path: &Path, dry_run: bool, format: &OutputFormat) -> Result<()> {
    let app = App::load(config_path)?;
    let migration = app.config.migration_config(dry_run)?;

    let mut audit = AuditRecord::start(
        app.config.checksum(migration.dry_run)?,
        app.config.key.id.trim().to_string(),
        migration.durability.to_string(),
        migration.dry_run,
    );
    log::info!("Run {} starting (config checksum {})", audit.run_id, audit.config_checksum);

    let job = app.migration_job(dry_run)?;
    let checkpoint = job.run().await?;

    audit.finish(&checkpoint);
    let audit_dir = app.config.migration.audit_dir.clone();
    let record = audit.clone();
    let audit_path = tokio::task::spawn_blocking(move || record.write(&audit_dir))
        .await?
        .context("Failed to write audit record")?;
    log::info!("Audit record written to {}", audit_path.display());

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&audit)?);
        }
        OutputFormat::Plain => {
            println!("Run:          {}", audit.run_id);
            println!("Dry run:      {}", audit.dry_run);
            println!("Scanned:      {}", checkpoint.scanned);
            println!("Encrypted:    {}", checkpoint.encrypted);
            println!("Written:      {}", checkpoint.written);
            println!("Quarantined:  {}", checkpoint.quarantined);
            if checkpoint.quarantined > 0 {
                println!(
                    "Quarantine:   {}",
                    app.config.migration.quarantine_dir.display()
                );
            }
        }
    }

    Ok(())
}
