use std::path::Path;

use anyhow::{Context, Result};

use crate::app::App;
use crate::OutputFormat;

pub fn run(config_path: &Path, format: &OutputFormat) -> Result<()> {
    let app = App::load(config_path)?;
    let store = app.checkpoint_store();
    let checkpoint = store.load().context("Failed to read checkpoint")?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "checkpointPath": store.path().to_string_lossy(),
                "checkpoint": checkpoint,
                "killSwitchEngaged": app.kill_switch().engaged(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => match checkpoint {
            None => println!("No checkpoint at {} (next run starts from the beginning)", store.path().display()),
            Some(cp) => {
                println!("Checkpoint:   {}", store.path().display());
                println!(
                    "Resume after: {}",
                    cp.last_successful_id.as_deref().unwrap_or("(beginning)")
                );
                println!("Scanned:      {}", cp.scanned);
                println!("Encrypted:    {}", cp.encrypted);
                println!("Written:      {}", cp.written);
                println!("Quarantined:  {}", cp.quarantined);
            }
        },
    }
    if matches!(format, OutputFormat::Plain) && app.kill_switch().engaged() {
        println!("Kill switch engaged at {}", app.config.migration.kill_switch_path.display());
    }

    Ok(())
}
