//! Streaming N-way XOR — the whitening pipeline.
//!
//! [`XorReader`] adapts N equally sized byte streams into one stream whose
//! i-th byte is the XOR of the i-th byte of every operand.  Chunking follows
//! the first source; every other source must supply exactly the same number
//! of bytes, and all sources must end together — a length mismatch aborts
//! the read.  Dropping the reader tears down every source stream, so an
//! aborted pipeline leaves nothing half-consumed.
//!
//! [`xor_streams`] drives a reader to completion, hashing bytes as they pass
//! so the derived block's address is known the moment the last chunk lands
//! in the sink.  Sinks see either the complete output or an error — callers
//! must not commit partial output to a store.
//!
//! XOR is associative, commutative, and self-inverse:
//! `XOR(XOR(a,b,c), b, c) == a`.  Operand order therefore never changes the
//! resulting checksum.

use std::io::{self, Read, Write};
use thiserror::Error;

use crate::checksum::{ChecksumBuffer, ChecksumHasher};

/// Chunk size for the pipeline; large enough to amortise syscalls, small
/// enough that Huge blocks never need block-sized buffers.
pub const XOR_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum XorError {
    #[error("XOR requires at least 2 source blocks")]
    NoBlocksToXor,
    #[error("Block sizes must match across all XOR operands")]
    BlockSizesMustMatch,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── XorReader ────────────────────────────────────────────────────────────────

/// N-way XOR as a [`Read`] adapter.
pub struct XorReader<R: Read> {
    sources: Vec<R>,
    scratch: Vec<u8>,
}

impl<R: Read> XorReader<R> {
    pub fn new(sources: Vec<R>) -> Result<Self, XorError> {
        if sources.len() < 2 {
            return Err(XorError::NoBlocksToXor);
        }
        Ok(Self { sources, scratch: Vec::new() })
    }
}

impl<R: Read> Read for XorReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        // The first source drives chunk alignment.
        let n = self.sources[0].read(out)?;
        if n == 0 {
            // First source is done — every other source must be too.
            let mut probe = [0u8; 1];
            for source in &mut self.sources[1..] {
                if source.read(&mut probe)? != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        XorError::BlockSizesMustMatch.to_string(),
                    ));
                }
            }
            return Ok(0);
        }

        self.scratch.resize(n, 0);
        for source in &mut self.sources[1..] {
            source.read_exact(&mut self.scratch).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        XorError::BlockSizesMustMatch.to_string(),
                    )
                } else {
                    e
                }
            })?;
            for (o, s) in out[..n].iter_mut().zip(&self.scratch) {
                *o ^= s;
            }
        }
        Ok(n)
    }
}

// ── Driving the pipeline ─────────────────────────────────────────────────────

/// XOR all `sources` into `sink`, returning the checksum and byte count of
/// the combined output.
///
/// The first source error aborts the pipeline; all sources are dropped and
/// the error surfaces.  The sink may have received a prefix by then, so
/// callers must stage into memory or a scratch location before committing.
pub fn xor_streams<R: Read, W: Write>(
    sources: Vec<R>,
    sink:    &mut W,
) -> Result<(ChecksumBuffer, u64), XorError> {
    let mut reader = XorReader::new(sources)?;
    let mut hasher = ChecksumHasher::new();
    let mut buf = vec![0u8; XOR_CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((hasher.finalize(), total))
}

/// In-memory XOR of N equal-length buffers.
pub fn xor_buffers(buffers: &[&[u8]]) -> Result<Vec<u8>, XorError> {
    if buffers.len() < 2 {
        return Err(XorError::NoBlocksToXor);
    }
    let len = buffers[0].len();
    if buffers[1..].iter().any(|b| b.len() != len) {
        return Err(XorError::BlockSizesMustMatch);
    }
    let mut out = buffers[0].to_vec();
    for buffer in &buffers[1..] {
        for (o, b) in out.iter_mut().zip(buffer.iter()) {
            *o ^= b;
        }
    }
    Ok(out)
}
