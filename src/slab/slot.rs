//! Slot addressing for the slab allocator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ptr::NonNull;

/// Position of a slot: block ordinal plus offset inside the block
///
/// Every slot also has a stable global index,
/// `block × slots_per_block + offset`, which is what callers usually keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId {
    /// Block ordinal
    pub block: u32,
    /// Slot offset within the block
    pub offset: u32,
}

impl SlotId {
    pub fn new(block: u32, offset: u32) -> Self {
        Self { block, offset }
    }

    /// Split a global index
    pub fn from_index(index: usize, slots_per_block: usize) -> Self {
        Self {
            block: (index / slots_per_block) as u32,
            offset: (index % slots_per_block) as u32,
        }
    }

    /// Global index of this slot
    pub fn index(&self, slots_per_block: usize) -> usize {
        self.block as usize * slots_per_block + self.offset as usize
    }

    pub fn block_index(&self) -> usize {
        self.block as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot(block={}, offset={})", self.block, self.offset)
    }
}

/// A freshly allocated slab slot
pub struct Slot<T> {
    /// Global index
    pub index: usize,
    pub id: SlotId,
    ptr: NonNull<T>,
}

impl<T> Slot<T> {
    pub(crate) fn new(index: usize, id: SlotId, ptr: NonNull<T>) -> Self {
        Self { index, id, ptr }
    }

    /// Pointer to the stored object, valid until the slot is erased
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub fn as_non_null(&self) -> NonNull<T> {
        self.ptr
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("ptr", &self.ptr)
            .finish()
    }
}
