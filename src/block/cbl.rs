//! Constituent Block Lists — blocks that describe file reassembly.
//!
//! # Layout inside the block data (all integers big-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0     64   creator_signature   ECDSA compact (r ‖ s) over [64..end of addresses]
//!   64      8   date_created        ms since Unix epoch, i64
//!   72      8   original_data_length  bytes of the source data
//!   80      4   address_count
//!   84      1   tuple_size          XOR arity used when whitening
//!   85     ...  address list        address_count × 64-byte checksums, dense
//! ```
//!
//! The extended form inserts a name region between the fixed header and the
//! address list:
//!
//! ```text
//!   85      1   file_name_length    1..=255
//!   86      1   mime_type_length    1..=255
//!   87      n   file_name           UTF-8, no NUL, no path separators
//!   87+n    m   mime_type           printable ASCII
//! ```
//!
//! The signature covers every header field after itself plus the dense
//! address list — not the random padding — so a CBL read back from a store
//! verifies even though its padding was never part of the signed region.
//!
//! Invariant: `address_count × 64 ≤ capacity` for the chosen block size.

use chrono::{DateTime, TimeZone, Utc};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SECP256K1};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::block::{Block, BlockDataType, BlockError, BlockOptions, BlockType};
use crate::block_size::BlockSize;
use crate::checksum::{ChecksumBuffer, CHECKSUM_LENGTH};
use crate::member::Member;

// ── Constants ────────────────────────────────────────────────────────────────

/// ECDSA compact signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Fixed header bytes before the (optional) name region and address list.
pub const CBL_HEADER_SIZE: usize = SIGNATURE_LENGTH + 8 + 8 + 4 + 1; // 85

/// Longest permitted file name / MIME type, in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

/// Default XOR arity recorded in new CBLs.
pub const DEFAULT_TUPLE_SIZE: u8 = 3;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CblError {
    #[error("{count} addresses exceed the capacity of {capacity} for this block size")]
    TooManyAddresses { count: usize, capacity: usize },
    #[error("Creator has no private key loaded")]
    CreatorKeyUnavailable,
    #[error("File name length {0} outside 1..={MAX_NAME_LENGTH}")]
    FileNameLength(usize),
    #[error("MIME type length {0} outside 1..={MAX_NAME_LENGTH}")]
    MimeTypeLength(usize),
    #[error("Invalid file name: {0}")]
    InvalidFileName(&'static str),
    #[error("Invalid MIME type: {0}")]
    InvalidMimeType(&'static str),
    #[error("Invalid list header: {0}")]
    InvalidHeader(String),
    #[error("Creator signature does not verify")]
    InvalidSignature,
    #[error("Block is not a constituent block list")]
    WrongBlockType,
    #[error(transparent)]
    Block(#[from] BlockError),
}

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CblHeader {
    pub signature:            [u8; SIGNATURE_LENGTH],
    pub date_created:         DateTime<Utc>,
    pub original_data_length: u64,
    pub address_count:        u32,
    pub tuple_size:           u8,
}

/// Name region of an extended list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CblExtension {
    pub file_name: String,
    pub mime_type: String,
}

// ── CblBlock ─────────────────────────────────────────────────────────────────

/// A parsed (or freshly built) constituent block list.
#[derive(Debug, Clone)]
pub struct CblBlock {
    block:     Block,
    header:    CblHeader,
    extension: Option<CblExtension>,
}

impl CblBlock {
    // ── Capacity ─────────────────────────────────────────────────────────────

    /// Addresses a plain CBL of `size` can hold.
    pub fn address_capacity(size: BlockSize) -> usize {
        (size.len() - CBL_HEADER_SIZE) / CHECKSUM_LENGTH
    }

    /// Addresses an extended CBL of `size` can hold given its name region.
    pub fn extended_address_capacity(
        size:          BlockSize,
        file_name_len: usize,
        mime_type_len: usize,
    ) -> usize {
        let overhead = CBL_HEADER_SIZE + 2 + file_name_len + mime_type_len;
        size.len().saturating_sub(overhead) / CHECKSUM_LENGTH
    }

    // ── Construction ─────────────────────────────────────────────────────────

    /// Build and sign a plain CBL.
    pub fn new(
        creator:              &Member,
        size:                 BlockSize,
        addresses:            &[ChecksumBuffer],
        original_data_length: u64,
        tuple_size:           u8,
    ) -> Result<Self, CblError> {
        Self::build(creator, size, addresses, original_data_length, tuple_size, None)
    }

    /// Build and sign an extended CBL carrying a file name and MIME type.
    pub fn new_extended(
        creator:              &Member,
        size:                 BlockSize,
        file_name:            &str,
        mime_type:            &str,
        addresses:            &[ChecksumBuffer],
        original_data_length: u64,
        tuple_size:           u8,
    ) -> Result<Self, CblError> {
        validate_file_name(file_name)?;
        validate_mime_type(mime_type)?;
        Self::build(
            creator,
            size,
            addresses,
            original_data_length,
            tuple_size,
            Some(CblExtension {
                file_name: file_name.to_owned(),
                mime_type: mime_type.to_owned(),
            }),
        )
    }

    fn build(
        creator:              &Member,
        size:                 BlockSize,
        addresses:            &[ChecksumBuffer],
        original_data_length: u64,
        tuple_size:           u8,
        extension:            Option<CblExtension>,
    ) -> Result<Self, CblError> {
        let secret_key = creator.private_key().ok_or(CblError::CreatorKeyUnavailable)?;
        if tuple_size < 2 {
            return Err(CblError::InvalidHeader(format!(
                "tuple size {tuple_size} below the XOR minimum of 2"
            )));
        }
        let capacity = match &extension {
            None => Self::address_capacity(size),
            Some(ext) => Self::extended_address_capacity(
                size,
                ext.file_name.len(),
                ext.mime_type.len(),
            ),
        };
        if addresses.len() > capacity {
            return Err(CblError::TooManyAddresses {
                count: addresses.len(),
                capacity,
            });
        }

        let date_created = Utc::now();
        let mut body = Vec::with_capacity(
            CBL_HEADER_SIZE
                + extension
                    .as_ref()
                    .map(|e| 2 + e.file_name.len() + e.mime_type.len())
                    .unwrap_or(0)
                + addresses.len() * CHECKSUM_LENGTH,
        );
        body.extend_from_slice(&[0u8; SIGNATURE_LENGTH]); // placeholder
        body.extend_from_slice(&date_created.timestamp_millis().to_be_bytes());
        body.extend_from_slice(&original_data_length.to_be_bytes());
        body.extend_from_slice(&(addresses.len() as u32).to_be_bytes());
        body.push(tuple_size);
        if let Some(ext) = &extension {
            body.push(ext.file_name.len() as u8);
            body.push(ext.mime_type.len() as u8);
            body.extend_from_slice(ext.file_name.as_bytes());
            body.extend_from_slice(ext.mime_type.as_bytes());
        }
        for address in addresses {
            body.extend_from_slice(address.as_bytes());
        }

        // Sign the header-and-addresses region, then patch the placeholder.
        let digest: [u8; 32] = Sha3_256::digest(&body[SIGNATURE_LENGTH..]).into();
        let signature = SECP256K1
            .sign_ecdsa(&Message::from_digest(digest), secret_key)
            .serialize_compact();
        body[..SIGNATURE_LENGTH].copy_from_slice(&signature);

        let block_type = if extension.is_some() {
            BlockType::ExtendedConstituentBlockList
        } else {
            BlockType::ConstituentBlockList
        };
        let block = Block::new(
            block_type,
            BlockDataType::EphemeralStructuredData,
            size,
            &body,
            BlockOptions {
                creator: Some(creator.id),
                date_created: Some(date_created),
                ..BlockOptions::default()
            },
        )?;

        Ok(Self {
            block,
            header: CblHeader {
                signature,
                date_created,
                original_data_length,
                address_count: addresses.len() as u32,
                tuple_size,
            },
            extension,
        })
    }

    // ── Parsing ──────────────────────────────────────────────────────────────

    /// Decode a CBL out of an already-framed block.
    pub fn parse(block: Block) -> Result<Self, CblError> {
        let extended = match block.block_type() {
            BlockType::ConstituentBlockList => false,
            BlockType::ExtendedConstituentBlockList => true,
            _ => return Err(CblError::WrongBlockType),
        };
        let data = block.data();

        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature.copy_from_slice(&data[..SIGNATURE_LENGTH]);
        let millis = i64::from_be_bytes(data[64..72].try_into().unwrap());
        let date_created = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| CblError::InvalidHeader(format!("bad timestamp {millis}")))?;
        if date_created > Utc::now() {
            return Err(BlockError::FutureCreationDate(date_created).into());
        }
        let original_data_length = u64::from_be_bytes(data[72..80].try_into().unwrap());
        let address_count = u32::from_be_bytes(data[80..84].try_into().unwrap());
        let tuple_size = data[84];
        if tuple_size < 2 {
            return Err(CblError::InvalidHeader(format!(
                "tuple size {tuple_size} below the XOR minimum of 2"
            )));
        }

        let extension = if extended {
            let name_len = data[85] as usize;
            let mime_len = data[86] as usize;
            if name_len == 0 || mime_len == 0 {
                return Err(CblError::InvalidHeader("empty name region field".into()));
            }
            let name_start = 87;
            let mime_start = name_start + name_len;
            let mime_end = mime_start + mime_len;
            if mime_end > data.len() {
                return Err(CblError::InvalidHeader("name region exceeds block".into()));
            }
            let file_name = std::str::from_utf8(&data[name_start..mime_start])
                .map_err(|_| CblError::InvalidFileName("not valid UTF-8"))?
                .to_owned();
            let mime_type = std::str::from_utf8(&data[mime_start..mime_end])
                .map_err(|_| CblError::InvalidMimeType("not valid UTF-8"))?
                .to_owned();
            validate_file_name(&file_name)?;
            validate_mime_type(&mime_type)?;
            Some(CblExtension { file_name, mime_type })
        } else {
            None
        };

        let addresses_start = Self::addresses_offset_for(&extension);
        let addresses_end = addresses_start + address_count as usize * CHECKSUM_LENGTH;
        if addresses_end > data.len() {
            return Err(CblError::InvalidHeader(format!(
                "{address_count} addresses exceed the block"
            )));
        }

        Ok(Self {
            block,
            header: CblHeader {
                signature,
                date_created,
                original_data_length,
                address_count,
                tuple_size,
            },
            extension,
        })
    }

    fn addresses_offset_for(extension: &Option<CblExtension>) -> usize {
        match extension {
            None => CBL_HEADER_SIZE,
            Some(ext) => CBL_HEADER_SIZE + 2 + ext.file_name.len() + ext.mime_type.len(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn header(&self) -> &CblHeader {
        &self.header
    }

    #[inline]
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn into_block(self) -> Block {
        self.block
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        self.extension.is_some()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.extension.as_ref().map(|e| e.file_name.as_str())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.extension.as_ref().map(|e| e.mime_type.as_str())
    }

    /// Decode the dense address list back into checksums.
    pub fn addresses(&self) -> Vec<ChecksumBuffer> {
        let start = Self::addresses_offset_for(&self.extension);
        self.block.data()[start..]
            .chunks_exact(CHECKSUM_LENGTH)
            .take(self.header.address_count as usize)
            .map(|c| ChecksumBuffer(c.try_into().unwrap()))
            .collect()
    }

    /// Verify the creator signature against `creator_key`.
    pub fn verify_signature(&self, creator_key: &PublicKey) -> Result<(), CblError> {
        let signed_end = Self::addresses_offset_for(&self.extension)
            + self.header.address_count as usize * CHECKSUM_LENGTH;
        let signed_region = &self.block.data()[SIGNATURE_LENGTH..signed_end];
        let digest: [u8; 32] = Sha3_256::digest(signed_region).into();
        let signature = Signature::from_compact(&self.header.signature)
            .map_err(|_| CblError::InvalidSignature)?;
        SECP256K1
            .verify_ecdsa(&Message::from_digest(digest), &signature, creator_key)
            .map_err(|_| CblError::InvalidSignature)
    }
}

// ── Name validation ──────────────────────────────────────────────────────────

fn validate_file_name(name: &str) -> Result<(), CblError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(CblError::FileNameLength(name.len()));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(CblError::InvalidFileName("contains control characters"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(CblError::InvalidFileName("contains a path separator"));
    }
    Ok(())
}

fn validate_mime_type(mime: &str) -> Result<(), CblError> {
    if mime.is_empty() || mime.len() > MAX_NAME_LENGTH {
        return Err(CblError::MimeTypeLength(mime.len()));
    }
    if !mime.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        return Err(CblError::InvalidMimeType("not printable ASCII"));
    }
    if !mime.contains('/') {
        return Err(CblError::InvalidMimeType("missing type/subtype separator"));
    }
    Ok(())
}
