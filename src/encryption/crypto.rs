//! Field-level authenticated encryption

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use super::errors::{EncryptionError, EncryptionResult};
use super::models::{EncryptionKey, Envelope, ALGORITHM_ID};

/// Nonce size in bytes for ChaCha20-Poly1305 (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Generate a random nonce for encryption
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypts single field values under one key, binding each ciphertext to the
/// id of the document it belongs to.
#[derive(Clone)]
pub struct FieldCipher {
    key: EncryptionKey,
    key_id: String,
}

impl FieldCipher {
    pub fn new(key: EncryptionKey, key_id: impl Into<String>) -> EncryptionResult<Self> {
        let key_id = key_id.into();
        if key_id.trim().is_empty() {
            return Err(EncryptionError::BlankKeyId);
        }
        Ok(Self { key, key_id })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn cipher(&self) -> EncryptionResult<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(self.key.as_bytes())
            .map_err(|_| EncryptionError::InvalidKeyLength(self.key.as_bytes().len()))
    }

    /// Encrypt `plaintext` with a fresh nonce, authenticating `document_id` as
    /// associated data.
    pub fn encrypt(&self, plaintext: &[u8], document_id: &str) -> EncryptionResult<Envelope> {
        let nonce_bytes = generate_nonce();
        let ciphertext = self
            .cipher()?
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: document_id.as_bytes(),
                },
            )
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        Ok(Envelope {
            alg: ALGORITHM_ID.to_string(),
            kid: self.key_id.clone(),
            iv: BASE64.encode(nonce_bytes),
            ct: BASE64.encode(ciphertext),
        })
    }

    /// Decrypt an envelope produced by [`FieldCipher::encrypt`] for the same
    /// document id.
    pub fn decrypt(&self, envelope: &Envelope, document_id: &str) -> EncryptionResult<Vec<u8>> {
        if envelope.alg != ALGORITHM_ID {
            return Err(EncryptionError::UnsupportedAlgorithm(envelope.alg.clone()));
        }
        if envelope.kid != self.key_id {
            return Err(EncryptionError::KeyIdMismatch {
                expected: self.key_id.clone(),
                found: envelope.kid.clone(),
            });
        }

        let nonce_bytes = BASE64.decode(&envelope.iv)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(EncryptionError::InvalidNonce {
                expected: NONCE_SIZE,
                actual: nonce_bytes.len(),
            });
        }
        let ciphertext = BASE64.decode(&envelope.ct)?;

        self.cipher()?
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: document_id.as_bytes(),
                },
            )
            .map_err(|_| EncryptionError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("key", &self.key)
            .field("key_id", &self.key_id)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_cipher() -> FieldCipher {
        let mut key = [0u8; 32];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        FieldCipher::new(EncryptionKey::new(key), "kid-1").unwrap()
    }

    #[test]
    fn test_envelope_shape() {
        let cipher = test_cipher();
        let env = cipher.encrypt(b"hello", "doc-1").unwrap();

        assert_eq!(env.alg, ALGORITHM_ID);
        assert_eq!(env.kid, "kid-1");
        assert_eq!(BASE64.decode(&env.iv).unwrap().len(), NONCE_SIZE);
        assert_eq!(BASE64.decode(&env.ct).unwrap().len(), 5 + TAG_SIZE);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = test_cipher();
        let env = cipher.encrypt(b"payload", "doc-99").unwrap();
        let decrypted = cipher.decrypt(&env, "doc-99").unwrap();
        assert_eq!(decrypted, b"payload");
    }

    #[test]
    fn test_same_plaintext_gets_fresh_nonce() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"same", "doc-1").unwrap();
        let b = cipher.encrypt(b"same", "doc-1").unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ct, b.ct);
        assert_eq!(cipher.decrypt(&a, "doc-1").unwrap(), b"same");
        assert_eq!(cipher.decrypt(&b, "doc-1").unwrap(), b"same");
    }

    #[test]
    fn test_wrong_document_id_fails_authentication() {
        let cipher = test_cipher();
        let env = cipher.encrypt(b"payload", "doc-good").unwrap();
        assert!(matches!(
            cipher.decrypt(&env, "doc-bad"),
            Err(EncryptionError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let cipher = test_cipher();
        let mut env = cipher.encrypt(b"payload", "doc-1").unwrap();
        let mut ct = BASE64.decode(&env.ct).unwrap();
        ct[0] ^= 0x01;
        env.ct = BASE64.encode(ct);
        assert!(matches!(
            cipher.decrypt(&env, "doc-1"),
            Err(EncryptionError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let cipher = test_cipher();
        let other = FieldCipher::new(EncryptionKey::new([9u8; 32]), "kid-1").unwrap();
        let env = cipher.encrypt(b"payload", "doc-1").unwrap();
        assert!(matches!(
            other.decrypt(&env, "doc-1"),
            Err(EncryptionError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_foreign_key_id_is_rejected() {
        let cipher = test_cipher();
        let mut env = cipher.encrypt(b"payload", "doc-1").unwrap();
        env.kid = "kid-2".to_string();
        assert!(matches!(
            cipher.decrypt(&env, "doc-1"),
            Err(EncryptionError::KeyIdMismatch { .. })
        ));
    }

    #[test]
    fn test_blank_key_id_rejected() {
        assert!(matches!(
            FieldCipher::new(EncryptionKey::new([1u8; 32]), "  "),
            Err(EncryptionError::BlankKeyId)
        ));
    }
}
