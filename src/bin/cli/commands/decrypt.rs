use std::path::Path;

use anyhow::{Context, Result};

use docferry_lib::pii::parse_document;

use crate::app::App;

pub fn run(config_path: &Path, document_id: &str, file: &Path) -> Result<()> {
    let app = App::load(config_path)?;
    let scanner = app.scanner()?;

    let document = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let plain = scanner.decrypt_document(&document, document_id)?;
    let value = parse_document(&plain)?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    Ok(())
}
