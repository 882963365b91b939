//! Block handles — lazy, content-addressed references into a store.
//!
//! A handle owns no block data; it records where the bytes live and what
//! their address must be.  Reads open the file on demand, and
//! [`validate`](BlockHandle::validate) streams the file through the checksum
//! hasher rather than loading it whole, so Huge blocks verify in constant
//! memory.
//!
//! [`BlockHandleTuple`] groups exactly [`TUPLE_SIZE`] handles of one block
//! size for XOR composition.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::block::BlockMetadata;
use crate::block_size::BlockSize;
use crate::checksum::{ChecksumBuffer, ChecksumHasher};
use crate::xor::XOR_CHUNK_SIZE;

/// Fixed XOR arity for whitening tuples.
pub const TUPLE_SIZE: usize = 3;

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("No block file at {}", .0.display())]
    NotFound(PathBuf),
    #[error("Block file is {actual} bytes, expected {expected}")]
    FileSizeMismatch { expected: usize, actual: u64 },
    #[error("Checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        expected: ChecksumBuffer,
        computed: ChecksumBuffer,
    },
    #[error("Handle reads have been revoked")]
    ReadRevoked,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TupleError {
    #[error("Tuple requires exactly {expected} handles, got {actual}")]
    InvalidTupleSize { expected: usize, actual: usize },
    #[error("All handles in a tuple must share one block size")]
    BlockSizeMismatch,
}

// ── BlockHandle ──────────────────────────────────────────────────────────────

/// Lazy reference to a stored block.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    checksum:    ChecksumBuffer,
    size:        BlockSize,
    path:        PathBuf,
    metadata:    Option<BlockMetadata>,
    can_read:    bool,
    can_persist: bool,
}

impl BlockHandle {
    pub fn new(
        checksum: ChecksumBuffer,
        size:     BlockSize,
        path:     PathBuf,
        metadata: Option<BlockMetadata>,
    ) -> Self {
        Self {
            checksum,
            size,
            path,
            metadata,
            can_read: true,
            can_persist: true,
        }
    }

    #[inline]
    pub fn checksum(&self) -> &ChecksumBuffer {
        &self.checksum
    }

    #[inline]
    pub fn size(&self) -> BlockSize {
        self.size
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn metadata(&self) -> Option<&BlockMetadata> {
        self.metadata.as_ref()
    }

    #[inline]
    pub fn can_read(&self) -> bool {
        self.can_read
    }

    #[inline]
    pub fn can_persist(&self) -> bool {
        self.can_persist
    }

    /// Permanently revoke reads through this handle.  One-way.
    pub fn revoke_read(&mut self) {
        self.can_read = false;
    }

    /// Permanently revoke persistence through this handle.  One-way.
    pub fn revoke_persist(&mut self) {
        self.can_persist = false;
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// The full padded `block_size` bytes.
    pub fn data(&self) -> Result<Vec<u8>, HandleError> {
        if !self.can_read {
            return Err(HandleError::ReadRevoked);
        }
        let data = std::fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HandleError::NotFound(self.path.clone())
            } else {
                HandleError::Io(e)
            }
        })?;
        if data.len() != self.size.len() {
            return Err(HandleError::FileSizeMismatch {
                expected: self.size.len(),
                actual:   data.len() as u64,
            });
        }
        Ok(data)
    }

    /// Open a buffered chunked reader over the block file.
    pub fn read_stream(&self) -> Result<BufReader<File>, HandleError> {
        if !self.can_read {
            return Err(HandleError::ReadRevoked);
        }
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HandleError::NotFound(self.path.clone())
            } else {
                HandleError::Io(e)
            }
        })?;
        Ok(BufReader::new(file))
    }

    /// Stream the file through the checksum hasher and compare against the
    /// handle's address.  Also enforces the exact-size invariant.
    pub fn validate(&self) -> Result<(), HandleError> {
        let mut stream = self.read_stream()?;
        let mut hasher = ChecksumHasher::new();
        let mut buf = vec![0u8; XOR_CHUNK_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        if total != self.size.len() as u64 {
            return Err(HandleError::FileSizeMismatch {
                expected: self.size.len(),
                actual:   total,
            });
        }
        let computed = hasher.finalize();
        if computed != self.checksum {
            return Err(HandleError::ChecksumMismatch {
                expected: self.checksum,
                computed,
            });
        }
        Ok(())
    }
}

// ── BlockHandleTuple ─────────────────────────────────────────────────────────

/// Fixed-arity grouping of handles destined for XOR composition.
#[derive(Debug, Clone)]
pub struct BlockHandleTuple {
    handles: Vec<BlockHandle>,
}

impl BlockHandleTuple {
    /// Requires exactly [`TUPLE_SIZE`] handles of one block size.
    pub fn new(handles: Vec<BlockHandle>) -> Result<Self, TupleError> {
        if handles.len() != TUPLE_SIZE {
            return Err(TupleError::InvalidTupleSize {
                expected: TUPLE_SIZE,
                actual:   handles.len(),
            });
        }
        let size = handles[0].size();
        if handles[1..].iter().any(|h| h.size() != size) {
            return Err(TupleError::BlockSizeMismatch);
        }
        Ok(Self { handles })
    }

    #[inline]
    pub fn handles(&self) -> &[BlockHandle] {
        &self.handles
    }

    #[inline]
    pub fn size(&self) -> BlockSize {
        self.handles[0].size()
    }

    /// Addresses of the tuple members, in caller order.
    pub fn checksums(&self) -> Vec<ChecksumBuffer> {
        self.handles.iter().map(|h| *h.checksum()).collect()
    }

    /// Validate every member; any failure means the tuple cannot be trusted.
    pub fn verify(&self) -> bool {
        self.handles.iter().all(|h| h.validate().is_ok())
    }

    /// XOR the tuple through the store's streaming pipeline, persist the
    /// derived block, and return its handle.
    pub fn xor_to_store(
        &self,
        store:     &super::DiskBlockStore,
        dest_meta: BlockMetadata,
    ) -> Result<BlockHandle, super::StoreError> {
        let derived = store.xor(&self.handles, dest_meta)?;
        store.set_data(&derived)
    }
}
