use anyhow::{Context, Result};
use zeroize::Zeroize;

use docferry_lib::encryption::{generate_key_b64, store_in_keyring};

use crate::OutputFormat;

pub fn run(keyring_service: Option<&str>, keyring_account: Option<&str>, format: &OutputFormat) -> Result<()> {
    let mut material = generate_key_b64();

    let stored = match (keyring_service, keyring_account) {
        (Some(service), Some(account)) => {
            store_in_keyring(service, account, &material).context("Failed to store key in keyring")?;
            log::info!("Key stored in keyring ({}/{})", service, account);
            true
        }
        _ => false,
    };

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "key": material,
                "storedInKeyring": stored,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => println!("{}", material),
    }

    material.zeroize();
    Ok(())
}
