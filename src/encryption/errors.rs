//! Encryption error types

use thiserror::Error;

/// Errors that can occur during encryption operations
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Key identifier must not be blank")]
    BlankKeyId,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Authentication failed: ciphertext, nonce, key or document id do not match")]
    AuthenticationFailed,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key id mismatch: envelope uses {found}, cipher holds {expected}")]
    KeyIdMismatch { expected: String, found: String },

    #[error("Invalid nonce size: expected {expected}, got {actual}")]
    InvalidNonce { expected: usize, actual: usize },

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Key material not found: {0}")]
    KeyNotFound(String),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EncryptionError {
    pub fn class(&self) -> &'static str {
        match self {
            EncryptionError::BlankKeyId => "EncryptionError::BlankKeyId",
            EncryptionError::EncryptionFailed => "EncryptionError::EncryptionFailed",
            EncryptionError::AuthenticationFailed => "EncryptionError::AuthenticationFailed",
            EncryptionError::UnsupportedAlgorithm(_) => "EncryptionError::UnsupportedAlgorithm",
            EncryptionError::KeyIdMismatch { .. } => "EncryptionError::KeyIdMismatch",
            EncryptionError::InvalidNonce { .. } => "EncryptionError::InvalidNonce",
            EncryptionError::InvalidKeyLength(_) => "EncryptionError::InvalidKeyLength",
            EncryptionError::KeyNotFound(_) => "EncryptionError::KeyNotFound",
            EncryptionError::Keyring(_) => "EncryptionError::Keyring",
            EncryptionError::Base64Error(_) => "EncryptionError::Base64Error",
            EncryptionError::IoError(_) => "EncryptionError::IoError",
        }
    }
}

/// Result type alias for encryption operations
pub type EncryptionResult<T> = Result<T, EncryptionError>;
