//! Slab Allocator
//!
//! Bitmap-tracked blocks of fixed-size slots with stable integer indices,
//! plus a dense heap wrapper that can be walked by position.
//!
//! # Architecture
//!
//! ```text
//! SlabHeap<T>
//!   ├─→ used: BitVec (heap-wide liveness, grows by doubling)
//!   └─→ SlabAllocator<T>
//!        ├─→ Block 0 [used bitmap | frontier | hint] ─→ slots 0..n
//!        ├─→ Block 1 ...                              ─→ slots n..2n
//!        └─→ chain: [0, 1, ...]  (last block serves allocations)
//! ```
//!
//! Global index = block ordinal × slots per block + offset. Freed slots
//! are found again through each block's frontier and free hint rather than
//! a free list. The allocator is single-threaded; wrap it in a lock to
//! share it. [`SharedSlabHeap`] hands out reference-counted handles whose
//! last drop erases the object.

pub mod allocator;
pub mod block;
pub mod heap;
pub mod iter;
pub mod shared;
pub mod slot;

pub use allocator::{SlabAllocator, SlabStats};
pub use block::SlabGeometry;
pub use heap::SlabHeap;
pub use iter::{Cursor, LiveIter, RawIter, RawSlot};
pub use shared::{SharedSlabHeap, SlabHandle};
pub use slot::{Slot, SlotId};
