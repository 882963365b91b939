//! Disk block store — content-addressed, two-level sharded.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/<size_label>/<hex[0:2]>/<hex[2:4]>/<full_hex>          block bytes
//! <root>/<size_label>/<hex[0:2]>/<hex[2:4]>/<full_hex>.m.json   sidecar
//! ```
//!
//! A block file contains exactly `block_size` bytes — no magic, no trailer,
//! no embedded metadata.  Meaning is supplied externally by constituent
//! block lists; the optional sidecar records the in-memory tags and
//! ephemeral metadata and is excluded from random sampling.
//!
//! # Invariants
//!
//! - A file at `block_path(k)` always holds `block_size` bytes whose
//!   checksum equals `k`.  Violations surface as `BlockFileSizeMismatch`
//!   or as a checksum mismatch on read/validate.
//! - The store is immutable by key: `set_data` uses test-and-create
//!   (`O_CREAT|O_EXCL` semantics), so concurrent writers of one key see at
//!   most one winner and the file is written at most once.  A failed write
//!   removes its partial file.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::{Block, BlockDataType, BlockError, BlockMetadata, BlockType};
use crate::block_size::BlockSize;
use crate::checksum::{calculate_checksum, ChecksumBuffer, CHECKSUM_LENGTH};
use crate::xor::{xor_buffers, xor_streams, XorError};

pub mod handle;

use handle::{BlockHandle, HandleError, TUPLE_SIZE};

/// Sidecar suffix; files ending in this are never sampled or enumerated as
/// blocks.
pub const METADATA_SUFFIX: &str = ".m.json";

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No block stored under {0}")]
    KeyNotFound(ChecksumBuffer),
    #[error("A block already exists at {}", .0.display())]
    BlockPathAlreadyExists(PathBuf),
    #[error("Block file is {actual} bytes, expected {expected}")]
    BlockFileSizeMismatch { expected: usize, actual: u64 },
    #[error("Store holds {store} blocks but was given a {block} block")]
    BlockSizeMismatch { store: BlockSize, block: BlockSize },
    #[error("Block failed validation: {0}")]
    BlockValidationFailed(#[from] BlockError),
    #[error("Block persistence has been revoked")]
    PersistRevoked,
    #[error("Could not create block directory {}: {source}", .path.display())]
    BlockDirectoryCreationFailed {
        path:   PathBuf,
        source: std::io::Error,
    },
    #[error("At least 2 blocks are required")]
    NoBlocksProvided,
    #[error(transparent)]
    Xor(#[from] XorError),
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error("Sidecar metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Sidecar ──────────────────────────────────────────────────────────────────

/// On-disk form of the in-memory tags + ephemeral metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlockMetadata {
    pub block_type: BlockType,
    pub data_type:  BlockDataType,
    #[serde(flatten)]
    pub metadata:   BlockMetadata,
}

// ── DiskBlockStore ───────────────────────────────────────────────────────────

/// A content-addressed store for blocks of one fixed size.
#[derive(Debug, Clone)]
pub struct DiskBlockStore {
    root: PathBuf,
    size: BlockSize,
}

impl DiskBlockStore {
    /// Open (creating if needed) the store for `size` under `base_dir`.
    pub fn new<P: AsRef<Path>>(base_dir: P, size: BlockSize) -> Result<Self, StoreError> {
        let root = base_dir.as_ref().join(size.label());
        fs::create_dir_all(&root).map_err(|source| {
            StoreError::BlockDirectoryCreationFailed { path: root.clone(), source }
        })?;
        Ok(Self { root, size })
    }

    #[inline]
    pub fn size(&self) -> BlockSize {
        self.size
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sharded path of a block: `<root>/<hex[0:2]>/<hex[2:4]>/<full_hex>`.
    pub fn block_path(&self, checksum: &ChecksumBuffer) -> PathBuf {
        let hex = checksum.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }

    fn metadata_path(&self, checksum: &ChecksumBuffer) -> PathBuf {
        let mut path = self.block_path(checksum).into_os_string();
        path.push(METADATA_SUFFIX);
        PathBuf::from(path)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Existence check — no validation.
    pub fn has(&self, checksum: &ChecksumBuffer) -> bool {
        self.block_path(checksum).is_file()
    }

    /// A lazy handle; never fails.  Validation is deferred until the handle
    /// is read or validated.
    pub fn get(&self, checksum: &ChecksumBuffer) -> BlockHandle {
        let metadata = self.read_sidecar(checksum).map(|s| s.metadata);
        BlockHandle::new(*checksum, self.size, self.block_path(checksum), metadata)
    }

    fn read_sidecar(&self, checksum: &ChecksumBuffer) -> Option<StoredBlockMetadata> {
        let file = File::open(self.metadata_path(checksum)).ok()?;
        serde_json::from_reader(BufReader::new(file)).ok()
    }

    /// Read a block fully into memory and revalidate it against its key.
    ///
    /// `date_created` comes from the sidecar when present, otherwise from
    /// the file's birth time (falling back to mtime).
    pub fn get_data(&self, checksum: &ChecksumBuffer) -> Result<Block, StoreError> {
        let path = self.block_path(checksum);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::KeyNotFound(*checksum)
            } else {
                StoreError::Io(e)
            }
        })?;
        if data.len() != self.size.len() {
            return Err(StoreError::BlockFileSizeMismatch {
                expected: self.size.len(),
                actual:   data.len() as u64,
            });
        }

        let computed = calculate_checksum(&data);
        if computed != *checksum {
            return Err(BlockError::ChecksumMismatch {
                expected: *checksum,
                computed,
            }
            .into());
        }

        let (block_type, data_type, metadata) = match self.read_sidecar(checksum) {
            Some(s) => (s.block_type, s.data_type, s.metadata),
            None => (
                BlockType::RawData,
                BlockDataType::RawData,
                BlockMetadata::new(file_creation_time(&path)?, self.size.len() as u64),
            ),
        };

        Ok(Block::from_framed(
            block_type,
            data_type,
            self.size,
            data,
            computed,
            metadata,
        ))
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Persist a validated block under its checksum.
    ///
    /// Fails with `BlockPathAlreadyExists` if the key is already present;
    /// the store never overwrites.  On a failed write the partial file is
    /// removed.
    pub fn set_data(&self, block: &Block) -> Result<BlockHandle, StoreError> {
        if block.size() != self.size {
            return Err(StoreError::BlockSizeMismatch {
                store: self.size,
                block: block.size(),
            });
        }
        if !block.can_persist() {
            return Err(StoreError::PersistRevoked);
        }
        block.validate()?;

        let path = self.block_path(block.checksum());
        let shard = path.parent().expect("block path always has a shard parent");
        fs::create_dir_all(shard).map_err(|source| {
            StoreError::BlockDirectoryCreationFailed { path: shard.to_path_buf(), source }
        })?;

        // Test-and-create: at most one concurrent writer of a key wins.
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::BlockPathAlreadyExists(path));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        if let Err(e) = file.write_all(block.data()).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(StoreError::Io(e));
        }

        let sidecar = StoredBlockMetadata {
            block_type: block.block_type(),
            data_type:  block.data_type(),
            metadata:   block.metadata().clone(),
        };
        if let Err(e) = fs::write(
            self.metadata_path(block.checksum()),
            serde_json::to_vec_pretty(&sidecar)?,
        ) {
            let _ = fs::remove_file(&path);
            let _ = fs::remove_file(self.metadata_path(block.checksum()));
            return Err(StoreError::Io(e));
        }

        Ok(BlockHandle::new(
            *block.checksum(),
            self.size,
            path,
            Some(block.metadata().clone()),
        ))
    }

    // ── XOR composition ──────────────────────────────────────────────────────

    /// Stream-XOR the blocks behind `handles` into a new derived block.
    ///
    /// The sources are read chunk-wise in lockstep; the derived block is
    /// checksummed as bytes pass and is never partially committed — the
    /// caller decides whether to persist the returned block.
    pub fn xor(
        &self,
        handles:   &[BlockHandle],
        dest_meta: BlockMetadata,
    ) -> Result<Block, StoreError> {
        if handles.len() < 2 {
            return Err(StoreError::NoBlocksProvided);
        }
        for handle in handles {
            if handle.size() != self.size {
                return Err(StoreError::BlockSizeMismatch {
                    store: self.size,
                    block: handle.size(),
                });
            }
        }
        let mut sources = Vec::with_capacity(handles.len());
        for handle in handles {
            sources.push(handle.read_stream().map_err(|e| match e {
                HandleError::NotFound(_) => StoreError::KeyNotFound(*handle.checksum()),
                other => StoreError::Handle(other),
            })?);
        }

        let mut sink = Vec::with_capacity(self.size.len());
        let (checksum, total) = xor_streams(sources, &mut sink)?;
        if total != self.size.len() as u64 {
            return Err(StoreError::BlockFileSizeMismatch {
                expected: self.size.len(),
                actual:   total,
            });
        }

        Ok(Block::from_framed(
            BlockType::RawData,
            BlockDataType::RawData,
            self.size,
            sink,
            checksum,
            dest_meta,
        ))
    }

    // ── Random sampling ──────────────────────────────────────────────────────

    /// Sample up to `count` distinct block addresses, roughly uniformly.
    ///
    /// Recurses the two shard levels at random, skipping missing or empty
    /// directories; a top-level shard that yields nothing new is removed
    /// from the candidate set.  May return fewer than `count`.
    pub fn random_checksums(&self, count: usize) -> Result<Vec<ChecksumBuffer>, StoreError> {
        let mut rng = rand::thread_rng();
        let mut candidates = read_dirs(&self.root)?;
        let mut chosen: HashSet<ChecksumBuffer> = HashSet::new();
        let mut out = Vec::with_capacity(count);

        while out.len() < count && !candidates.is_empty() {
            let i = rng.gen_range(0..candidates.len());
            match self.random_in_shard(&candidates[i], &chosen, &mut rng)? {
                Some(checksum) => {
                    chosen.insert(checksum);
                    out.push(checksum);
                }
                None => {
                    // Exhausted — nothing new under this top-level shard.
                    candidates.swap_remove(i);
                }
            }
        }
        Ok(out)
    }

    fn random_in_shard<R: Rng>(
        &self,
        shard:  &Path,
        chosen: &HashSet<ChecksumBuffer>,
        rng:    &mut R,
    ) -> Result<Option<ChecksumBuffer>, StoreError> {
        let mut subdirs = read_dirs(shard)?;
        subdirs.shuffle(rng);
        for subdir in subdirs {
            let files: Vec<ChecksumBuffer> = block_files(&subdir)?
                .into_iter()
                .filter(|c| !chosen.contains(c))
                .collect();
            if let Some(&checksum) = files.choose(rng) {
                return Ok(Some(checksum));
            }
        }
        Ok(None)
    }

    // ── Whitening ────────────────────────────────────────────────────────────

    /// Whiten `source` against `TUPLE_SIZE − 1` randomly selected stored
    /// blocks, minting fresh random blocks when the store cannot supply
    /// enough.  Returns the handle of the stored XOR result and the full
    /// tuple of addresses (`result` first, then the whiteners) — XORing all
    /// of them reproduces `source`.
    pub fn whiten(
        &self,
        source: &Block,
    ) -> Result<(BlockHandle, Vec<ChecksumBuffer>), StoreError> {
        if source.size() != self.size {
            return Err(StoreError::BlockSizeMismatch {
                store: self.size,
                block: source.size(),
            });
        }

        let mut whiteners = self.random_checksums(TUPLE_SIZE - 1)?;
        // Never whiten a block against itself.
        whiteners.retain(|c| c != source.checksum());
        while whiteners.len() < TUPLE_SIZE - 1 {
            let random = Block::random(self.size);
            let handle = self.set_data(&random)?;
            whiteners.push(*handle.checksum());
        }

        let mut operands: Vec<Vec<u8>> = Vec::with_capacity(TUPLE_SIZE);
        operands.push(source.data().to_vec());
        for checksum in &whiteners {
            operands.push(self.get_data(checksum)?.data().to_vec());
        }
        let operand_refs: Vec<&[u8]> = operands.iter().map(|v| v.as_slice()).collect();
        let combined = xor_buffers(&operand_refs)?;
        let checksum = calculate_checksum(&combined);

        let derived = Block::from_framed(
            BlockType::RawData,
            BlockDataType::RawData,
            self.size,
            combined,
            checksum,
            BlockMetadata::now(self.size.len() as u64),
        );
        let handle = self.set_data(&derived)?;

        let mut addresses = Vec::with_capacity(TUPLE_SIZE);
        addresses.push(*handle.checksum());
        addresses.extend(whiteners);
        Ok((handle, addresses))
    }

    // ── Diagnostics ──────────────────────────────────────────────────────────

    /// Number of blocks and total block bytes in the store.
    pub fn usage(&self) -> Result<(u64, u64), StoreError> {
        let mut blocks = 0u64;
        for shard in read_dirs(&self.root)? {
            for subdir in read_dirs(&shard)? {
                blocks += block_files(&subdir)?.len() as u64;
            }
        }
        Ok((blocks, blocks * self.size.len() as u64))
    }
}

// ── Directory helpers ────────────────────────────────────────────────────────

fn read_dirs(path: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(path) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(StoreError::Io(e)),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.path());
        }
    }
    Ok(out)
}

/// Block addresses within one leaf shard; sidecars and foreign files are
/// skipped.
fn block_files(dir: &Path) -> Result<Vec<ChecksumBuffer>, StoreError> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(StoreError::Io(e)),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(METADATA_SUFFIX) || name.len() != CHECKSUM_LENGTH * 2 {
            continue;
        }
        if let Ok(checksum) = ChecksumBuffer::from_hex(&name) {
            out.push(checksum);
        }
    }
    Ok(out)
}

fn file_creation_time(path: &Path) -> Result<DateTime<Utc>, StoreError> {
    let meta = fs::metadata(path)?;
    let time = meta.created().or_else(|_| meta.modified())?;
    Ok(DateTime::<Utc>::from(time))
}
