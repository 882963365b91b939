//! Block core — fixed-size, checksum-addressed records.
//!
//! # In-memory layout
//!
//! ```text
//! [ layer header (0+ bytes) | payload | random padding ]
//! └──────────────── exactly block_size bytes ───────────┘
//! ```
//!
//! A block's `data` is always exactly `block_size` bytes.  The factory copies
//! the supplied bytes into the prefix of a buffer pre-filled with
//! cryptographically random padding, then seals the whole buffer under its
//! SHA3-512 checksum.  Random padding means two blocks framing the same short
//! payload get different addresses; whitened blocks therefore leak nothing
//! about payload length beyond what metadata records.
//!
//! # Validation order (first failure wins)
//!
//! 1. `data.len()` ≥ the variant's minimum layer overhead
//! 2. `data.len()` ≤ `block_size`
//! 3. `actual_data_length` (when given) ≤ `block_size − total_overhead`
//! 4. `date_created` ≤ now
//! 5. frame into the random-padded buffer, checksum it
//! 6. caller-supplied checksum, if any, must match the computed one
//!
//! Variants are a tagged dispatch ([`BlockType`] + [`BlockDataType`]), not an
//! inheritance tree; overhead and header decoding switch on the tags.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block_size::BlockSize;
use crate::checksum::{calculate_checksum, ChecksumBuffer};
use crate::crypto::ecies::{self, EciesError, EciesHeader, ECIES_OVERHEAD};
use crate::member::MemberId;

pub mod cbl;

use cbl::CBL_HEADER_SIZE;

// ── Tags ─────────────────────────────────────────────────────────────────────

/// Role of a block.  Contextual, in-memory only — never written into the
/// block bytes; stores persist it in the metadata sidecar when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    RawData,
    EncryptedOwnedData,
    ConstituentBlockList,
    ExtendedConstituentBlockList,
    Handle,
    /// Whitening block — pure random bytes.
    Random,
    Ephemeral,
}

/// Shape of the bytes inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockDataType {
    RawData,
    EncryptedData,
    EphemeralStructuredData,
}

/// Fixed header bytes at the start of `data` for a given variant.
///
/// ExtendedCBL carries a variable name/mime region on top of this fixed
/// part; its true overhead comes from the parsed header (see [`cbl`]).
pub fn layer_overhead(block_type: BlockType, data_type: BlockDataType) -> usize {
    match (block_type, data_type) {
        (_, BlockDataType::EncryptedData) => ECIES_OVERHEAD,
        (BlockType::ConstituentBlockList, _)
        | (BlockType::ExtendedConstituentBlockList, _) => CBL_HEADER_SIZE,
        _ => 0,
    }
}

// ── Metadata ─────────────────────────────────────────────────────────────────

/// Ephemeral block metadata — carried beside the bytes, never inside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub date_created:           DateTime<Utc>,
    /// True payload length before random padding (for encrypted blocks, the
    /// plaintext length).
    pub length_without_padding: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator:                Option<MemberId>,
    #[serde(default)]
    pub encrypted:              bool,
}

impl BlockMetadata {
    pub fn new(date_created: DateTime<Utc>, length_without_padding: u64) -> Self {
        Self {
            date_created,
            length_without_padding,
            creator: None,
            encrypted: false,
        }
    }

    pub fn now(length_without_padding: u64) -> Self {
        Self::new(Utc::now(), length_without_padding)
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Data length {actual} below the {minimum}-byte minimum for this variant")]
    DataLengthTooShort { minimum: usize, actual: usize },
    #[error("Data length {actual} exceeds capacity {capacity}")]
    DataLengthExceedsCapacity { capacity: usize, actual: usize },
    #[error("Creation date {0} is in the future")]
    FutureCreationDate(DateTime<Utc>),
    #[error("Checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        expected: ChecksumBuffer,
        computed: ChecksumBuffer,
    },
    #[error("Block is not readable")]
    ReadRevoked,
    #[error("Invalid block header: {0}")]
    InvalidHeader(String),
    #[error(transparent)]
    Envelope(#[from] EciesError),
}

// ── Options ──────────────────────────────────────────────────────────────────

/// Optional inputs to [`Block::new`].
#[derive(Debug, Clone, Default)]
pub struct BlockOptions {
    /// Expected checksum; the factory fails on mismatch with the computed one.
    pub checksum:           Option<ChecksumBuffer>,
    pub creator:            Option<MemberId>,
    /// Defaults to now.  Must not lie in the future.
    pub date_created:       Option<DateTime<Utc>>,
    /// True payload length when the supplied bytes include layer headers
    /// (e.g. the plaintext length of an encrypted block).
    pub actual_data_length: Option<u64>,
}

// ── Block ────────────────────────────────────────────────────────────────────

/// A fixed-size, checksum-addressed byte record.
#[derive(Debug, Clone)]
pub struct Block {
    block_type:  BlockType,
    data_type:   BlockDataType,
    size:        BlockSize,
    data:        Vec<u8>,
    checksum:    ChecksumBuffer,
    metadata:    BlockMetadata,
    can_read:    bool,
    can_persist: bool,
}

impl Block {
    /// Frame `data` into a sealed block.  See the module docs for the
    /// validation order.
    pub fn new(
        block_type: BlockType,
        data_type:  BlockDataType,
        size:       BlockSize,
        data:       &[u8],
        opts:       BlockOptions,
    ) -> Result<Self, BlockError> {
        let overhead = layer_overhead(block_type, data_type);
        if data.len() < overhead {
            return Err(BlockError::DataLengthTooShort {
                minimum: overhead,
                actual:  data.len(),
            });
        }
        if data.len() > size.len() {
            return Err(BlockError::DataLengthExceedsCapacity {
                capacity: size.len(),
                actual:   data.len(),
            });
        }
        if let Some(actual) = opts.actual_data_length {
            let capacity = (size.len() - overhead) as u64;
            if actual > capacity {
                return Err(BlockError::DataLengthExceedsCapacity {
                    capacity: capacity as usize,
                    actual:   actual as usize,
                });
            }
        }
        let date_created = opts.date_created.unwrap_or_else(Utc::now);
        if date_created > Utc::now() {
            return Err(BlockError::FutureCreationDate(date_created));
        }

        // Random-fill first, then overwrite the prefix: layer headers stay
        // intact, the tail `[data.len(), size)` is unpredictable.
        let mut framed = vec![0u8; size.len()];
        OsRng.fill_bytes(&mut framed);
        framed[..data.len()].copy_from_slice(data);

        let computed = calculate_checksum(&framed);
        if let Some(expected) = opts.checksum {
            if expected != computed {
                return Err(BlockError::ChecksumMismatch { expected, computed });
            }
        }

        let metadata = BlockMetadata {
            date_created,
            length_without_padding: opts.actual_data_length.unwrap_or(data.len() as u64),
            creator: opts.creator,
            encrypted: data_type == BlockDataType::EncryptedData,
        };

        Ok(Self {
            block_type,
            data_type,
            size,
            data: framed,
            checksum: computed,
            metadata,
            can_read: true,
            can_persist: true,
        })
    }

    /// A whitening block: `size` bytes of pure randomness.
    pub fn random(size: BlockSize) -> Self {
        let mut data = vec![0u8; size.len()];
        OsRng.fill_bytes(&mut data);
        let checksum = calculate_checksum(&data);
        Self {
            block_type:  BlockType::Random,
            data_type:   BlockDataType::RawData,
            size,
            data,
            checksum,
            metadata:    BlockMetadata::now(size.len() as u64),
            can_read:    true,
            can_persist: true,
        }
    }

    /// Reconstruct a block from already-framed `size`-length bytes (a store
    /// read or a finished XOR pipeline).  The checksum is taken as computed
    /// by the producer; callers verify via [`validate`](Self::validate).
    pub(crate) fn from_framed(
        block_type: BlockType,
        data_type:  BlockDataType,
        size:       BlockSize,
        data:       Vec<u8>,
        checksum:   ChecksumBuffer,
        metadata:   BlockMetadata,
    ) -> Self {
        debug_assert_eq!(data.len(), size.len());
        Self {
            block_type,
            data_type,
            size,
            data,
            checksum,
            metadata,
            can_read: true,
            can_persist: true,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    #[inline]
    pub fn data_type(&self) -> BlockDataType {
        self.data_type
    }

    #[inline]
    pub fn size(&self) -> BlockSize {
        self.size
    }

    /// The full `block_size` bytes, padding included.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn checksum(&self) -> &ChecksumBuffer {
        &self.checksum
    }

    #[inline]
    pub fn metadata(&self) -> &BlockMetadata {
        &self.metadata
    }

    #[inline]
    pub fn can_read(&self) -> bool {
        self.can_read
    }

    #[inline]
    pub fn can_persist(&self) -> bool {
        self.can_persist
    }

    /// Header bytes this layer interprets (empty for raw blocks).
    pub fn layer_header_data(&self) -> &[u8] {
        &self.data[..self.total_overhead()]
    }

    /// `data` minus the layer header — payload plus padding.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.total_overhead()..]
    }

    /// Allocated payload window.
    #[inline]
    pub fn payload_length(&self) -> usize {
        self.size.len() - self.total_overhead()
    }

    #[inline]
    pub fn total_overhead(&self) -> usize {
        layer_overhead(self.block_type, self.data_type)
    }

    /// Usable payload capacity for this variant at this size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.payload_length()
    }

    // ── State gates ──────────────────────────────────────────────────────────

    /// Permanently revoke reads.  One-way.
    pub fn revoke_read(&mut self) {
        self.can_read = false;
    }

    /// Permanently revoke persistence.  One-way.
    pub fn revoke_persist(&mut self) {
        self.can_persist = false;
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Recompute the checksum over `data` and recheck the date invariant.
    /// Only corruption can make this fail for a factory-built block.
    pub fn validate(&self) -> Result<(), BlockError> {
        if !self.can_read {
            return Err(BlockError::ReadRevoked);
        }
        let computed = calculate_checksum(&self.data);
        if computed != self.checksum {
            return Err(BlockError::ChecksumMismatch {
                expected: self.checksum,
                computed,
            });
        }
        if self.metadata.date_created > Utc::now() {
            return Err(BlockError::FutureCreationDate(self.metadata.date_created));
        }
        Ok(())
    }
}

// ── Encrypted blocks ─────────────────────────────────────────────────────────

/// ECIES-wrap `plaintext` for `recipient` and frame it as an encrypted block.
///
/// `metadata.length_without_padding` records the plaintext length; the
/// ciphertext occupies `[97, 97 + plaintext.len())` of the block data, the
/// rest is random padding.
pub fn encrypt_into_block(
    recipient: &PublicKey,
    size:      BlockSize,
    plaintext: &[u8],
    creator:   Option<MemberId>,
) -> Result<Block, BlockError> {
    let capacity = size.len().saturating_sub(ECIES_OVERHEAD);
    if plaintext.len() > capacity {
        return Err(BlockError::DataLengthExceedsCapacity {
            capacity,
            actual: plaintext.len(),
        });
    }
    let envelope = ecies::encrypt(recipient, plaintext)?;
    Block::new(
        BlockType::EncryptedOwnedData,
        BlockDataType::EncryptedData,
        size,
        &envelope,
        BlockOptions {
            creator,
            actual_data_length: Some(plaintext.len() as u64),
            ..BlockOptions::default()
        },
    )
}

/// Invert [`encrypt_into_block`] with the recipient's secret key.
pub fn decrypt_block(block: &Block, secret_key: &SecretKey) -> Result<Vec<u8>, BlockError> {
    if block.data_type() != BlockDataType::EncryptedData {
        return Err(BlockError::InvalidHeader(
            "block does not carry an encryption envelope".into(),
        ));
    }
    if !block.can_read() {
        return Err(BlockError::ReadRevoked);
    }
    let header = EciesHeader::parse(block.data())?;
    let ciphertext_len = block.metadata().length_without_padding as usize;
    let end = ECIES_OVERHEAD + ciphertext_len;
    if end > block.data().len() {
        return Err(BlockError::InvalidHeader(
            "recorded plaintext length exceeds the block".into(),
        ));
    }
    let ciphertext = &block.data()[ECIES_OVERHEAD..end];
    Ok(ecies::decrypt_parts(secret_key, &header, ciphertext)?)
}
