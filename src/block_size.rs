//! Block sizes — the closed set of fixed block capacities.
//!
//! Every block in the store is exactly one of these sizes; there is no
//! dynamic sizing.  The lower-case label doubles as the top-level store
//! directory name, so it is part of the on-disk contract and frozen.
//!
//! | Variant | Bytes       | Label     |
//! |---------|-------------|-----------|
//! | Message | 512         | `message` |
//! | Tiny    | 1 024       | `tiny`    |
//! | Small   | 4 096       | `small`   |
//! | Medium  | 1 048 576   | `medium`  |
//! | Large   | 67 108 864  | `large`   |
//! | Huge    | 268 435 456 | `huge`    |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed byte capacity of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSize {
    Message,
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
}

/// All sizes, smallest first.
pub const ALL_BLOCK_SIZES: [BlockSize; 6] = [
    BlockSize::Message,
    BlockSize::Tiny,
    BlockSize::Small,
    BlockSize::Medium,
    BlockSize::Large,
    BlockSize::Huge,
];

impl BlockSize {
    /// Exact byte length of a block of this size.
    #[inline]
    pub const fn len(self) -> usize {
        match self {
            BlockSize::Message => 512,
            BlockSize::Tiny    => 1_024,
            BlockSize::Small   => 4_096,
            BlockSize::Medium  => 1_048_576,
            BlockSize::Large   => 67_108_864,
            BlockSize::Huge    => 268_435_456,
        }
    }

    /// Store directory label.  Frozen — on-disk paths depend on it.
    pub const fn label(self) -> &'static str {
        match self {
            BlockSize::Message => "message",
            BlockSize::Tiny    => "tiny",
            BlockSize::Small   => "small",
            BlockSize::Medium  => "medium",
            BlockSize::Large   => "large",
            BlockSize::Huge    => "huge",
        }
    }

    /// Inverse of [`label`](Self::label).
    pub fn from_label(s: &str) -> Option<Self> {
        ALL_BLOCK_SIZES.iter().copied().find(|b| b.label() == s)
    }

    /// Map an exact byte length back to its size variant.
    pub fn from_len(len: usize) -> Option<Self> {
        ALL_BLOCK_SIZES.iter().copied().find(|b| b.len() == len)
    }

    /// Smallest size whose capacity holds `len` payload bytes after
    /// `overhead` header bytes, if any.
    pub fn smallest_for(len: usize, overhead: usize) -> Option<Self> {
        ALL_BLOCK_SIZES
            .iter()
            .copied()
            .find(|b| b.len() >= overhead && b.len() - overhead >= len)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
