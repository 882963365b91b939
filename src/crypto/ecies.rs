//! ECIES envelope — hybrid public-key encryption over secp256k1.
//!
//! # Wire layout (97-byte header, big-endian where applicable)
//!
//! ```text
//! Offset  Size  Field
//!    0     65   ephemeral_public_key  uncompressed SEC1 point, leading 0x04
//!   65     16   iv                    AES-256-GCM initialisation vector
//!   81     16   auth_tag              GCM authentication tag
//!   97    ...   ciphertext            same length as the plaintext
//! ```
//!
//! Key schedule: a fresh ephemeral keypair is generated per envelope; the
//! ECDH shared secret between the ephemeral secret key and the recipient's
//! public key is used directly as the AES-256 key.  The recipient recovers
//! the same key from the ephemeral public key in the header and their own
//! secret key.
//!
//! The GCM tag lives in the header rather than after the ciphertext so the
//! ciphertext length always equals the plaintext length, which lets block
//! framing compute payload capacity without inspecting the envelope.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use thiserror::Error;

/// AES-256-GCM with the envelope's 16-byte IV.
type EnvelopeCipher = AesGcm<Aes256, U16>;

/// SEC1 uncompressed public key length, leading `0x04` included.
pub const PUBLIC_KEY_LENGTH: usize = 65;
/// Uncompressed-point prefix byte.
pub const PUBLIC_KEY_PREFIX: u8 = 0x04;
/// GCM initialisation vector length.
pub const IV_LENGTH: usize = 16;
/// GCM authentication tag length.
pub const AUTH_TAG_LENGTH: usize = 16;
/// Total header bytes prefixed to every envelope.
pub const ECIES_OVERHEAD: usize = PUBLIC_KEY_LENGTH + IV_LENGTH + AUTH_TAG_LENGTH;

#[derive(Error, Debug)]
pub enum EciesError {
    #[error("Invalid envelope header: {0}")]
    InvalidHeader(&'static str),
    #[error("Decryption failed — tag mismatch or wrong key")]
    DecryptionFailure,
    #[error("Invalid key material")]
    InvalidKey,
    #[error("Encryption failed")]
    EncryptionFailure,
}

/// Parsed 97-byte envelope header.
#[derive(Debug, Clone)]
pub struct EciesHeader {
    pub ephemeral_public_key: [u8; PUBLIC_KEY_LENGTH],
    pub iv:                   [u8; IV_LENGTH],
    pub auth_tag:             [u8; AUTH_TAG_LENGTH],
}

impl EciesHeader {
    /// Parse the header prefix of `buffer`.
    ///
    /// Validates total length and the `0x04` point prefix; the point itself
    /// is validated later when the key is deserialized.
    pub fn parse(buffer: &[u8]) -> Result<Self, EciesError> {
        if buffer.len() < ECIES_OVERHEAD {
            return Err(EciesError::InvalidHeader("buffer shorter than header"));
        }
        if buffer[0] != PUBLIC_KEY_PREFIX {
            return Err(EciesError::InvalidHeader("missing 0x04 point prefix"));
        }
        let mut ephemeral_public_key = [0u8; PUBLIC_KEY_LENGTH];
        ephemeral_public_key.copy_from_slice(&buffer[..PUBLIC_KEY_LENGTH]);
        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(&buffer[PUBLIC_KEY_LENGTH..PUBLIC_KEY_LENGTH + IV_LENGTH]);
        let mut auth_tag = [0u8; AUTH_TAG_LENGTH];
        auth_tag.copy_from_slice(&buffer[PUBLIC_KEY_LENGTH + IV_LENGTH..ECIES_OVERHEAD]);
        Ok(Self { ephemeral_public_key, iv, auth_tag })
    }
}

/// Encrypt `plaintext` for `recipient`, returning `header || ciphertext`.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, EciesError> {
    let (ephemeral_sk, ephemeral_pk) = SECP256K1.generate_keypair(&mut OsRng);
    let shared = SharedSecret::new(recipient, &ephemeral_sk);

    let cipher = EnvelopeCipher::new_from_slice(&shared.secret_bytes())
        .map_err(|_| EciesError::InvalidKey)?;
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    // The aead API appends the tag to the ciphertext; split it back out so
    // it can live in the header.
    let mut sealed = cipher
        .encrypt(aes_gcm::Nonce::from_slice(&iv), plaintext)
        .map_err(|_| EciesError::EncryptionFailure)?;
    let tag_at = sealed.len() - AUTH_TAG_LENGTH;
    let auth_tag = sealed.split_off(tag_at);
    let ciphertext = sealed;

    let mut out = Vec::with_capacity(ECIES_OVERHEAD + ciphertext.len());
    out.extend_from_slice(&ephemeral_pk.serialize_uncompressed());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&auth_tag);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `header || ciphertext` buffer produced by [`encrypt`].
pub fn decrypt(secret_key: &SecretKey, buffer: &[u8]) -> Result<Vec<u8>, EciesError> {
    decrypt_parts(secret_key, &EciesHeader::parse(buffer)?, &buffer[ECIES_OVERHEAD..])
}

/// Decrypt with an already-parsed header and a separately held ciphertext.
///
/// Block framing stores the header at the start of a fixed-size buffer and
/// knows the true ciphertext length from metadata; this entry point avoids
/// reassembling a contiguous envelope.
pub fn decrypt_parts(
    secret_key: &SecretKey,
    header:     &EciesHeader,
    ciphertext: &[u8],
) -> Result<Vec<u8>, EciesError> {
    let ephemeral_pk = PublicKey::from_slice(&header.ephemeral_public_key)
        .map_err(|_| EciesError::InvalidHeader("ephemeral key is not a curve point"))?;
    let shared = SharedSecret::new(&ephemeral_pk, secret_key);

    let cipher = EnvelopeCipher::new_from_slice(&shared.secret_bytes())
        .map_err(|_| EciesError::InvalidKey)?;

    let mut sealed = Vec::with_capacity(ciphertext.len() + AUTH_TAG_LENGTH);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(&header.auth_tag);

    cipher
        .decrypt(aes_gcm::Nonce::from_slice(&header.iv), sealed.as_slice())
        .map_err(|_| EciesError::DecryptionFailure)
}
