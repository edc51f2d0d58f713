//! Chunk Pool
//!
//! Block-of-chunks bump allocator for objects of a single type.
//!
//! # Architecture
//!
//! ```text
//! ChunkPool<T>
//!   └─→ Mutex<PoolState>
//!        ├─→ Block 0 ─→ [Chunk 0][Chunk 1] ... [Chunk 31]
//!        ├─→ Block 1 ─→ [Chunk 32] ...
//!        └─→ current ─→ Chunk 7 ─→ Chunk 3 ─→ Chunk 8 ─→ None
//!                        (bump)    (recycled)  (fresh)
//! ```
//!
//! Objects are bump-allocated from the current chunk. When it is full the
//! pool moves to the next chunk in the chain, allocating a new block only
//! when the chain runs out. A chunk whose last object is released goes back
//! into the chain right after the current chunk, so it is the next one
//! consumed. Blocks are returned to the system only when the pool's shared
//! state is dropped.
//!
//! All bookkeeping happens under one pool-wide lock. Object construction
//! and destruction run outside it.

pub mod chunk;
pub mod chunk_pool;
pub mod handle;

pub use chunk::{ChunkGeometry, ChunkId, CHUNK_HEADER_BYTES};
pub use chunk_pool::{ChunkPool, PoolPtr, PoolStats};
pub use handle::PoolHandle;
