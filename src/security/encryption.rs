//! At-rest encryption for security state snapshots.
//!
//! AES-256-GCM over a small self-describing envelope: magic, format version,
//! random 96-bit nonce, then ciphertext with the authentication tag. Any
//! failure is a hard error; there is no plaintext passthrough.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

/// Encryption key size (256 bits).
pub const KEY_SIZE: usize = 32;
/// Nonce size (96 bits for GCM).
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Envelope magic.
const MAGIC: &[u8; 4] = b"EPAY";
/// Envelope format version.
const VERSION: u8 = 1;
/// Magic plus version byte.
const HEADER_LEN: usize = 5;

/// PBKDF2-HMAC-SHA256 rounds for passphrase-derived keys.
const PBKDF2_ROUNDS: u32 = 600_000;

/// Errors from the at-rest cipher.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("No encryption key configured")]
    KeyUnavailable,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// AES-256-GCM cipher for snapshots and other at-rest state.
pub struct AtRestCipher {
    cipher: Aes256Gcm,
}

impl AtRestCipher {
    /// Build from raw key bytes. The key must be exactly [`KEY_SIZE`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeySize {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;
        Ok(Self { cipher })
    }

    /// Derive a key from a passphrase and salt.
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        let key = Key::<Aes256Gcm>::from(key);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Fresh random key from the OS entropy source.
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Encrypt into an envelope. Each call draws a fresh nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(HEADER_LEN + NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(MAGIC);
        envelope.push(VERSION);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if envelope.len() < HEADER_LEN + NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::InvalidEnvelope("too short".to_string()));
        }
        if &envelope[..MAGIC.len()] != MAGIC {
            return Err(CryptoError::InvalidEnvelope("bad magic".to_string()));
        }
        let version = envelope[MAGIC.len()];
        if version != VERSION {
            return Err(CryptoError::InvalidEnvelope(format!(
                "unsupported version {version}"
            )));
        }

        let nonce = Nonce::from_slice(&envelope[HEADER_LEN..HEADER_LEN + NONCE_SIZE]);
        let ciphertext = &envelope[HEADER_LEN + NONCE_SIZE..];
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Serialize a value to JSON and encrypt it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CryptoError> {
        let plaintext =
            serde_json::to_vec(value).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        self.encrypt(&plaintext)
    }

    /// Decrypt an envelope and deserialize the JSON inside.
    pub fn decrypt_json<T: DeserializeOwned>(&self, envelope: &[u8]) -> Result<T, CryptoError> {
        let plaintext = self.decrypt(envelope)?;
        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn create_test_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    fn cipher() -> AtRestCipher {
        AtRestCipher::new(&create_test_key()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = cipher();
        let plaintext = b"Hello, World! This is a test message.";

        let envelope = cipher.encrypt(plaintext.as_slice()).unwrap();
        assert!(envelope.starts_with(b"EPAY"));
        let decrypted = cipher.decrypt(&envelope).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let cipher = cipher();
        let envelope = cipher.encrypt(b"").unwrap();
        let decrypted = cipher.decrypt(&envelope).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_encrypt_decrypt_large() {
        let cipher = cipher();
        let plaintext: Vec<u8> = (0..10000).map(|i| (i % 256) as u8).collect();
        let envelope = cipher.encrypt(&plaintext).unwrap();
        let decrypted = cipher.decrypt(&envelope).unwrap();
        assert_eq!(plaintext, decrypted);
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let cipher = cipher();
        let a = cipher.encrypt(b"same input").unwrap();
        let b = cipher.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let cipher = cipher();
        let mut envelope = cipher.encrypt(b"Test message").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0xFF;
        let result = cipher.decrypt(&envelope);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let cipher = cipher();
        let mut envelope = cipher.encrypt(b"Test message").unwrap();
        envelope[0] = b'X';
        let result = cipher.decrypt(&envelope);
        assert!(matches!(result, Err(CryptoError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let cipher = cipher();
        let mut envelope = cipher.encrypt(b"Test message").unwrap();
        envelope[4] = 9;
        let result = cipher.decrypt(&envelope);
        assert!(matches!(result, Err(CryptoError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let cipher = cipher();
        let result = cipher.decrypt(b"EPAY");
        assert!(matches!(result, Err(CryptoError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let envelope = cipher().encrypt(b"Test message").unwrap();
        let other = AtRestCipher::new(&AtRestCipher::generate_key()).unwrap();
        let result = other.decrypt(&envelope);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_invalid_key_size_reported() {
        let result = AtRestCipher::new(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeySize {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_passphrase_derived_keys() {
        let salt: &[u8] = b"echopay-test-salt";
        let enc1 = AtRestCipher::from_passphrase("correct horse", salt);
        let enc2 = AtRestCipher::from_passphrase("correct horse", salt);
        let enc3 = AtRestCipher::from_passphrase("wrong horse", salt);

        let envelope = enc1.encrypt(b"Test message").unwrap();
        assert_eq!(enc2.decrypt(&envelope).unwrap(), b"Test message");
        assert!(enc3.decrypt(&envelope).is_err());
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        assert_ne!(AtRestCipher::generate_key(), AtRestCipher::generate_key());
    }

    #[test]
    fn test_json_roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Snapshot {
            user_id: String,
            template_count: usize,
        }
        let cipher = cipher();
        let snapshot = Snapshot {
            user_id: "user-1".to_string(),
            template_count: 3,
        };
        let envelope = cipher.encrypt_json(&snapshot).unwrap();
        let restored: Snapshot = cipher.decrypt_json(&envelope).unwrap();
        assert_eq!(snapshot, restored);
    }
}
