//! Allocator configuration
//!
//! Byte budgets for chunk pools and slab heaps. Per-type geometry
//! (objects per chunk, slots per block) is derived from these budgets and
//! `size_of::<T>()` when an allocator is constructed, so every `T` gets
//! its own block layout.
//!
//! ```toml
//! [pool]
//! chunk_bytes = 8192
//! chunks_per_block = 32
//!
//! [slab]
//! block_bytes = 32768
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Chunk pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Size of one chunk in bytes (header bookkeeping included)
    pub chunk_bytes: usize,
    /// Number of chunks carved out of each block
    pub chunks_per_block: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 8192,
            chunks_per_block: 32,
        }
    }
}

impl PoolConfig {
    /// Total bytes requested from the system allocator per block
    pub fn block_bytes(&self) -> usize {
        self.chunk_bytes.saturating_mul(self.chunks_per_block)
    }

    /// Check the budgets before any geometry is derived from them
    pub fn validate(&self) -> Result<()> {
        if self.chunks_per_block == 0 {
            return Err(Error::InvalidConfig(
                "chunks_per_block must be at least 1".to_string(),
            ));
        }
        if self.chunks_per_block > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "chunks_per_block {} exceeds {}",
                self.chunks_per_block,
                u32::MAX
            )));
        }
        if self.chunk_bytes <= crate::pool::CHUNK_HEADER_BYTES {
            return Err(Error::InvalidConfig(format!(
                "chunk_bytes {} leaves no room after the {}-byte chunk header",
                self.chunk_bytes,
                crate::pool::CHUNK_HEADER_BYTES
            )));
        }
        if self.chunk_bytes.checked_mul(self.chunks_per_block).is_none()
            || self.block_bytes() > isize::MAX as usize
        {
            return Err(Error::InvalidConfig(format!(
                "block of {} x {} bytes overflows the address space",
                self.chunks_per_block, self.chunk_bytes
            )));
        }
        Ok(())
    }
}

/// Slab heap configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlabConfig {
    /// Size of one slab block in bytes
    pub block_bytes: usize,
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self {
            block_bytes: 4096 * 8,
        }
    }
}

impl SlabConfig {
    /// Check the block budget
    pub fn validate(&self) -> Result<()> {
        if self.block_bytes == 0 {
            return Err(Error::InvalidConfig(
                "block_bytes must be non-zero".to_string(),
            ));
        }
        if self.block_bytes > isize::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "block_bytes {} overflows the address space",
                self.block_bytes
            )));
        }
        Ok(())
    }
}

/// Combined configuration, as read from a TOML file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocConfig {
    pub pool: PoolConfig,
    pub slab: SlabConfig,
}

impl AllocConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: AllocConfig = toml::from_str(source)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.slab.validate()
    }
}
