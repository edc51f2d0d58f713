//! Dense, index-addressable heap over the slab allocator

use super::allocator::SlabAllocator;
use super::iter::{Cursor, LiveIter, RawIter, RawSlot};
use super::slot::Slot;
use crate::config::SlabConfig;
use crate::error::Result;
use bitvec::vec::BitVec;
use std::ops::{Index, IndexMut};
use std::ptr::NonNull;
use tracing::debug;

/// Initial capacity of the heap-wide liveness bitmap, in bits
const INITIAL_BITS: usize = 4096;

/// A slab allocator plus a heap-wide liveness bitmap
///
/// Objects are addressed by their global slot index. [`SlabHeap::size`] is
/// one past the highest index ever issued, which makes `0..size()` the
/// range walked by [`SlabHeap::iter`] and by [`Cursor`]s. Raw iteration
/// visits every index in that range, dead slots included; use
/// [`SlabHeap::iter_live`] to see live objects only.
pub struct SlabHeap<T> {
    alloc: SlabAllocator<T>,
    used: BitVec,
    size: usize,
}

impl<T> SlabHeap<T> {
    pub fn new() -> Result<Self> {
        Self::with_config(SlabConfig::default())
    }

    pub fn with_config(config: SlabConfig) -> Result<Self> {
        Ok(Self {
            alloc: SlabAllocator::with_config(config)?,
            used: BitVec::repeat(false, INITIAL_BITS),
            size: 0,
        })
    }

    /// Move `value` into the heap
    pub fn emplace(&mut self, value: T) -> Slot<T> {
        let slot = self.alloc.allocate(value);
        let index = slot.index;

        if index >= self.used.len() {
            let mut bits = self.used.len().max(INITIAL_BITS);
            while index >= bits {
                bits *= 2;
            }
            debug!(from = self.used.len(), to = bits, "Growing slab heap bitmap");
            self.used.resize(bits, false);
        }
        self.used.set(index, true);
        self.size = self.size.max(index + 1);
        slot
    }

    /// Drop the object at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is not live.
    pub fn erase(&mut self, index: usize) {
        drop(self.take(index));
    }

    /// Move the object at `index` out of the heap
    ///
    /// # Panics
    ///
    /// Panics if `index` is not live.
    pub fn take(&mut self, index: usize) -> T {
        assert!(
            self.contains(index),
            "slab heap index {} is not live",
            index
        );
        self.used.set(index, false);
        self.alloc.take(index)
    }

    /// Drop the object at `ptr`
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point at a live object of this heap.
    pub fn erase_ptr(&mut self, ptr: *const T) {
        match self.alloc.index_of(ptr) {
            Some(index) => self.erase(index),
            None => panic!("pointer {:p} was not issued by this heap", ptr),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.used.get(index).map_or(false, |bit| *bit)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if !self.contains(index) {
            return None;
        }
        self.alloc.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if !self.contains(index) {
            return None;
        }
        self.alloc.get_mut(index)
    }

    /// Slot address for `index` without a liveness check
    ///
    /// `None` only when the index lies in a block that is not held.
    pub fn ptr(&self, index: usize) -> Option<NonNull<T>> {
        self.alloc.ptr(index)
    }

    /// Index of the slot at `ptr`, live or not
    pub fn index_of(&self, ptr: *const T) -> Option<usize> {
        self.alloc.index_of(ptr)
    }

    /// One past the highest index ever issued
    pub fn size(&self) -> usize {
        self.size
    }

    /// Live objects
    pub fn len(&self) -> usize {
        self.alloc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alloc.is_empty()
    }

    /// Cursor at index 0
    pub fn begin(&self) -> Cursor<'_, T> {
        Cursor::new(self, 0)
    }

    /// Cursor at [`SlabHeap::size`]
    pub fn end(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.size as isize)
    }

    /// Every slot in `0..size()`, dead ones included
    pub fn iter(&self) -> RawIter<'_, T> {
        RawIter::new(self, 0, self.size)
    }

    /// Live objects with their indices, in index order
    pub fn iter_live(&self) -> LiveIter<'_, T> {
        LiveIter::new(self.iter())
    }

    pub fn allocator(&self) -> &SlabAllocator<T> {
        &self.alloc
    }

    /// Drop every object and start over from index 0
    pub fn clear(&mut self) {
        self.alloc.clear();
        self.used.clear();
        self.used.resize(INITIAL_BITS, false);
        self.size = 0;
    }

    /// View of slot `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`SlabHeap::size`].
    pub(crate) fn raw_slot(&self, index: usize) -> RawSlot<'_, T> {
        assert!(
            index < self.size,
            "slab heap position {} out of range 0..{}",
            index,
            self.size
        );
        RawSlot::new(index, self.alloc.ptr(index), self.contains(index))
    }
}

impl<T> Index<usize> for SlabHeap<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("slab heap index {} is not live", index),
        }
    }
}

impl<T> IndexMut<usize> for SlabHeap<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("slab heap index {} is not live", index),
        }
    }
}

impl<'a, T> IntoIterator for &'a SlabHeap<T> {
    type Item = RawSlot<'a, T>;
    type IntoIter = RawIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
