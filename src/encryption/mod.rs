//! Field-level encryption for PII values
//!
//! This module provides:
//! - ChaCha20-Poly1305 authenticated encryption bound to a document id
//! - The `{v, _enc}` wrapper written in place of an encrypted field
//! - Key material loading from env, file or the OS keyring

pub mod crypto;
pub mod errors;
pub mod keys;
pub mod models;

// Re-export commonly used types
pub use crypto::{generate_nonce, FieldCipher, NONCE_SIZE, TAG_SIZE};
pub use errors::{EncryptionError, EncryptionResult};
pub use keys::{decode_key, generate_key_b64, load_key, store_in_keyring, KeySource};
pub use models::{EncryptionKey, Envelope, FieldWrapper, ALGORITHM_ID, ENC_MARKER, WRAPPER_VERSION};
