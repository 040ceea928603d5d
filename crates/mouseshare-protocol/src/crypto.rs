//! Session key derivation and frame sealing.
//!
//! A shared password is stretched with HKDF-SHA256 to a 256-bit AES-GCM key.
//! Sealed frame bodies are nonce ‖ ciphertext ‖ tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::ProtocolError;

const KEY_SALT: &[u8] = b"mouseshare/v1";
const KEY_INFO: &[u8] = b"session-key";

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Derive the per-session 256-bit key from the shared password.
pub fn derive_session_key(password: &str) -> Result<[u8; 32], ProtocolError> {
    let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), password.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(KEY_INFO, &mut key)
        .map_err(|_| ProtocolError::KeyDerivation)?;
    Ok(key)
}

/// Seals and opens frame bodies with AES-256-GCM.
pub struct SessionCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

impl SessionCipher {
    /// Build a cipher from a password-derived key.
    pub fn from_password(password: &str) -> Result<Self, ProtocolError> {
        let key = derive_session_key(password)?;
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        })
    }

    /// Seal a plaintext body: fresh random nonce, then ciphertext ‖ tag.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| ProtocolError::Serialization("AEAD seal failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed body. Fails with [`ProtocolError::DecryptFailed`] when
    /// the key does not match or the frame was tampered with.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(ProtocolError::DecryptFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProtocolError::DecryptFailed)
    }
}
