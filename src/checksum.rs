//! Content checksums — SHA3-512 block addresses.
//!
//! A block's identity IS its checksum: the 64-byte SHA3-512 digest of its
//! full `block_size` bytes, padding included.  The hex form of the digest is
//! the block's file name in the store, so the hash family and width are
//! frozen.  Every identity comparison in the crate routes through
//! [`ChecksumBuffer`]; nothing compares raw byte slices directly.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_512};
use std::fmt;
use thiserror::Error;

/// Byte width of a checksum (SHA3-512).
pub const CHECKSUM_LENGTH: usize = 64;

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("Checksum must be {CHECKSUM_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
    #[error("Invalid hex in checksum: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Fixed-width content hash serving as a block address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChecksumBuffer(pub [u8; CHECKSUM_LENGTH]);

impl ChecksumBuffer {
    #[inline]
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LENGTH] {
        &self.0
    }

    /// Lower-case hex form — the on-disk file name.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, ChecksumError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChecksumError> {
        let arr: [u8; CHECKSUM_LENGTH] = bytes
            .try_into()
            .map_err(|_| ChecksumError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ChecksumBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ChecksumBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full 128-char hex is unreadable in assertion output; show a prefix.
        write!(f, "ChecksumBuffer({}…)", &self.to_hex()[..16])
    }
}

// Hex on the wire — sidecars and quorum records stay human-inspectable.
impl Serialize for ChecksumBuffer {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChecksumBuffer {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        ChecksumBuffer::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Hash a complete in-memory buffer.
pub fn calculate_checksum(bytes: &[u8]) -> ChecksumBuffer {
    let digest = Sha3_512::digest(bytes);
    ChecksumBuffer(digest.into())
}

/// Incremental hasher for data that arrives in chunks (file streams, the
/// XOR pipeline).  Produces the same digest as [`calculate_checksum`].
#[derive(Default)]
pub struct ChecksumHasher {
    inner: Sha3_512,
}

impl ChecksumHasher {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finalize(self) -> ChecksumBuffer {
        ChecksumBuffer(self.inner.finalize().into())
    }
}
