//! Symmetric codec — AES-256-GCM with single-use random keys.
//!
//! Encrypted payload layout: [ nonce (12 B) | ciphertext | GCM tag (16 B) ]
//!
//! Keys are generated fresh for every sealing and never reused; there is no
//! password derivation anywhere in the engine.  The JSON helpers serialize a
//! value with serde before sealing so that quorum records can protect
//! arbitrary structured data.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use aes_gcm::Aes256Gcm;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod ecies;
pub mod shamir;

/// Byte length of the AES-GCM nonce prepended to every encrypted payload.
pub const NONCE_LENGTH: usize = 12;

/// Byte length of a symmetric key (AES-256).
pub const SYMMETRIC_KEY_LENGTH: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailure,
    #[error("Decryption failed — wrong key or corrupted data")]
    DecryptionFailure,
    #[error("Key must be {SYMMETRIC_KEY_LENGTH} bytes")]
    InvalidKey,
    #[error("Encrypted payload too short (minimum {NONCE_LENGTH} bytes)")]
    TooShort,
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single-use AES-256 key.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey(pub [u8; SYMMETRIC_KEY_LENGTH]);

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SYMMETRIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(arr))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LENGTH] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        write!(f, "SymmetricKey(…)")
    }
}

/// Encrypt `plaintext` with AES-256-GCM using a random nonce.
///
/// Returns `nonce (12 B) || ciphertext || GCM-tag (16 B)`.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailure)?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an AES-256-GCM payload produced by [`encrypt`].
///
/// Input must start with the 12-byte nonce followed by ciphertext + GCM tag.
pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LENGTH {
        return Err(CryptoError::TooShort);
    }
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
    let nonce = aes_gcm::Nonce::from_slice(&data[..NONCE_LENGTH]);
    cipher
        .decrypt(nonce, &data[NONCE_LENGTH..])
        .map_err(|_| CryptoError::DecryptionFailure)
}

/// Serialize `value` as JSON and seal it under a fresh random key.
///
/// The returned key is the only way to open the ciphertext; callers own its
/// distribution (typically via Shamir shares, see [`crate::quorum`]).
pub fn seal_json<T: Serialize>(value: &T) -> Result<(SymmetricKey, Vec<u8>), CryptoError> {
    let plaintext = serde_json::to_vec(value)?;
    let key = SymmetricKey::generate();
    let sealed = encrypt(&key, &plaintext)?;
    Ok((key, sealed))
}

/// Inverse of [`seal_json`].
pub fn open_json<T: DeserializeOwned>(
    data: &[u8],
    key: &SymmetricKey,
) -> Result<T, CryptoError> {
    let plaintext = decrypt(key, data)?;
    Ok(serde_json::from_slice(&plaintext)?)
}
