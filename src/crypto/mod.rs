//! Symmetric payload encryption for ledger submissions.
//!
//! One static 32-byte key is shared across the deployment; there is no
//! per-record key rotation. The wire form is `base64(nonce || ciphertext)`
//! so payloads can be stored as plain strings on the ledger.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::contracts::CryptoError;

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts ledger payload strings with the deployment key.
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl PayloadCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Builds a cipher from a hex-encoded 32-byte key.
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key_hex)?;
        let key: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self::new(&key))
    }

    /// Encrypts a plaintext string into the ledger wire form.
    ///
    /// An empty plaintext maps to the empty string, which the ledger treats
    /// as the unused-slot sentinel.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypts a ledger wire-form string back to plaintext.
    ///
    /// The empty string decrypts to the empty string so callers can pass
    /// sentinel slots through unchanged.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let data = BASE64.decode(ciphertext)?;
        if data.len() <= NONCE_LEN {
            return Err(CryptoError::CiphertextTooShort {
                len: data.len(),
                min: NONCE_LEN + 1,
            });
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(String::from_utf8(plaintext)?)
    }
}
