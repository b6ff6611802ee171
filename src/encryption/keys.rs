//! Key material loading for the field cipher

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::errors::{EncryptionError, EncryptionResult};
use super::models::EncryptionKey;

/// Where the 256-bit field key is read from. In every case the material is
/// base64 of exactly 32 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum KeySource {
    /// Environment variable
    Env { env_var: String },
    /// File on disk (trailing whitespace ignored)
    File { path: PathBuf },
    /// OS credential store
    Keyring { service: String, account: String },
}

/// Load the field key from its configured source
pub fn load_key(source: &KeySource) -> EncryptionResult<EncryptionKey> {
    let mut material = match source {
        KeySource::Env { env_var } => std::env::var(env_var)
            .map_err(|_| EncryptionError::KeyNotFound(format!("env var {}", env_var)))?,
        KeySource::File { path } => std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EncryptionError::KeyNotFound(path.display().to_string())
            } else {
                EncryptionError::IoError(e)
            }
        })?,
        KeySource::Keyring { service, account } => {
            let entry = keyring::Entry::new(service, account)
                .map_err(|e| EncryptionError::Keyring(e.to_string()))?;
            entry.get_password().map_err(|e| match e {
                keyring::Error::NoEntry => {
                    EncryptionError::KeyNotFound(format!("keyring {}/{}", service, account))
                }
                other => EncryptionError::Keyring(other.to_string()),
            })?
        }
    };

    let key = decode_key(&material);
    material.zeroize();
    key
}

/// Decode base64 key material into a 256-bit key
pub fn decode_key(material: &str) -> EncryptionResult<EncryptionKey> {
    let mut raw = BASE64.decode(material.trim())?;
    if raw.len() != 32 {
        let len = raw.len();
        raw.zeroize();
        return Err(EncryptionError::InvalidKeyLength(len));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&raw);
    raw.zeroize();
    let out = EncryptionKey::new(key);
    key.zeroize();
    Ok(out)
}

/// Generate fresh key material, base64-encoded
pub fn generate_key_b64() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    let encoded = BASE64.encode(key);
    key.zeroize();
    encoded
}

/// Store key material in the OS credential store
pub fn store_in_keyring(service: &str, account: &str, material: &str) -> EncryptionResult<()> {
    let entry =
        keyring::Entry::new(service, account).map_err(|e| EncryptionError::Keyring(e.to_string()))?;
    entry
        .set_password(material)
        .map_err(|e| EncryptionError::Keyring(e.to_string()))
}
