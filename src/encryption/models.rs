//! Encryption data models

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Algorithm identifier written into every envelope
pub const ALGORITHM_ID: &str = "CHACHA20-POLY1305";

/// Object key that marks a field value as already encrypted
pub const ENC_MARKER: &str = "_enc";

/// Version of the field wrapper layout
pub const WRAPPER_VERSION: u32 = 1;

/// Self-describing ciphertext package for a single field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Algorithm identifier
    pub alg: String,
    /// Identifier of the key used
    pub kid: String,
    /// Nonce (base64-encoded)
    pub iv: String,
    /// Ciphertext with the authentication tag appended (base64-encoded)
    pub ct: String,
}

/// JSON value substituted for an encrypted field: `{"v": 1, "_enc": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWrapper {
    pub v: u32,
    #[serde(rename = "_enc")]
    pub enc: Envelope,
}

impl FieldWrapper {
    pub fn new(enc: Envelope) -> Self {
        Self {
            v: WRAPPER_VERSION,
            enc,
        }
    }
}

/// Encryption key with secure memory handling
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    /// The 256-bit key
    key: [u8; 32],
}

impl EncryptionKey {
    /// Create a new encryption key from raw bytes
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
