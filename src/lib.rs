//! # brightchain — content-addressed, encrypted, whitened block storage
//!
//! Engine guarantees (frozen):
//! - Every block is exactly one of the fixed [`BlockSize`] capacities; its
//!   address is the SHA3-512 checksum of all `block_size` bytes
//! - Short payloads are padded with cryptographically random bytes, so
//!   identical payloads yield distinct addresses by design
//! - Stores are immutable by key: one writer per path wins, files are
//!   written at most once, and a stored file always re-hashes to its name
//! - Encryption envelopes are ECIES over secp256k1 with a fixed 97-byte
//!   header; all multi-byte header integers are big-endian
//! - Whitening is streaming N-way XOR; the derived block's address is known
//!   the moment the last chunk is emitted
//! - Quorum sealing splits a single-use AES-256 key into Shamir shares over
//!   an explicitly sized GF(2^bits) field; no process-global crypto state

pub mod block;
pub mod block_size;
pub mod checksum;
pub mod crypto;
pub mod member;
pub mod quorum;
pub mod store;
pub mod xor;

// Flat re-exports for the most common types.
pub use block::cbl::{CblBlock, CblError, CBL_HEADER_SIZE, DEFAULT_TUPLE_SIZE};
pub use block::{
    decrypt_block, encrypt_into_block, Block, BlockDataType, BlockError, BlockMetadata,
    BlockOptions, BlockType,
};
pub use block_size::BlockSize;
pub use checksum::{calculate_checksum, ChecksumBuffer, ChecksumHasher, CHECKSUM_LENGTH};
pub use crypto::ecies::{EciesError, ECIES_OVERHEAD};
pub use crypto::shamir::{GfShamir, ShamirError};
pub use crypto::{CryptoError, SymmetricKey};
pub use member::{Member, MemberId};
pub use quorum::{seal, unseal, QuorumDataRecord, QuorumError, MAX_SHARES, MIN_SHARES};
pub use store::handle::{BlockHandle, BlockHandleTuple, HandleError, TupleError, TUPLE_SIZE};
pub use store::{DiskBlockStore, StoreError};
pub use xor::{xor_buffers, xor_streams, XorError, XorReader};
