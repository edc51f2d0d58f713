//! Chunk bookkeeping and per-type geometry

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::raw::RawBlock;
use std::alloc::Layout;
use std::fmt;
use std::mem::size_of;

/// Bytes charged to every chunk for its header
///
/// A chunk's `used` count starts here, so a chunk is empty exactly when
/// `used == CHUNK_HEADER_BYTES`.
pub const CHUNK_HEADER_BYTES: usize = size_of::<ChunkHeader>();

/// Pool-wide chunk number (block × chunks per block + position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(usize);

impl ChunkId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index into the pool's chunk table
    pub fn index(self) -> usize {
        self.0
    }

    /// Ordinal of the block holding this chunk
    pub fn block(self, chunks_per_block: usize) -> usize {
        self.0 / chunks_per_block
    }

    /// Position of this chunk inside its block
    pub fn position(self, chunks_per_block: usize) -> usize {
        self.0 % chunks_per_block
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk({})", self.0)
    }
}

/// Header of one chunk
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkHeader {
    /// Next unused slot in the chunk (bump cursor)
    pub head: u32,
    /// Occupied bytes, header included
    pub used: usize,
    /// Next chunk in the chain
    pub next: Option<ChunkId>,
}

impl ChunkHeader {
    pub(crate) fn new(next: Option<ChunkId>) -> Self {
        Self {
            head: 0,
            used: CHUNK_HEADER_BYTES,
            next,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.used == CHUNK_HEADER_BYTES
    }
}

/// Block and chunk layout derived for one object type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGeometry {
    /// `size_of::<T>()`
    pub object_size: usize,
    /// Objects that fit in one chunk after its header
    pub objects_per_chunk: u32,
    /// Chunks per block
    pub chunks_per_block: usize,
    pub(crate) layout: Layout,
}

impl ChunkGeometry {
    /// Derive the geometry of `T` under `config`
    ///
    /// Rejects zero-sized types and types that do not fit in one chunk.
    pub fn for_type<T>(config: &PoolConfig) -> Result<Self> {
        config.validate()?;

        let object_size = size_of::<T>();
        if object_size == 0 {
            return Err(Error::ZeroSized(std::any::type_name::<T>()));
        }

        let payload = config.chunk_bytes - CHUNK_HEADER_BYTES;
        let per_chunk = payload / object_size;
        if per_chunk == 0 {
            return Err(Error::ObjectTooLarge {
                size: object_size,
                capacity: payload,
            });
        }
        let objects_per_chunk = u32::try_from(per_chunk).map_err(|_| {
            Error::InvalidConfig(format!(
                "{} objects per chunk exceeds {}",
                per_chunk,
                u32::MAX
            ))
        })?;

        let block_slots = per_chunk * config.chunks_per_block;
        let layout = RawBlock::<T>::layout_for(block_slots).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "block of {} objects of {} bytes cannot be laid out",
                block_slots, object_size
            ))
        })?;

        Ok(Self {
            object_size,
            objects_per_chunk,
            chunks_per_block: config.chunks_per_block,
            layout,
        })
    }

    /// Object slots per block
    pub fn block_slots(&self) -> usize {
        self.objects_per_chunk as usize * self.chunks_per_block
    }

    /// Bytes a completely full chunk reports as used
    pub fn chunk_capacity_bytes(&self) -> usize {
        CHUNK_HEADER_BYTES + self.objects_per_chunk as usize * self.object_size
    }

    /// Block-local slot of `slot` within `chunk`
    pub(crate) fn block_offset(&self, chunk: ChunkId, slot: u32) -> usize {
        chunk.position(self.chunks_per_block) * self.objects_per_chunk as usize + slot as usize
    }
}
