//! Slab blocks: liveness bitmap, frontier and free hint

use crate::config::SlabConfig;
use crate::error::{Error, Result};
use crate::raw::RawBlock;
use bitvec::vec::BitVec;
use std::alloc::Layout;
use std::mem::size_of;
use std::ptr::NonNull;

/// Slot layout derived for one object type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabGeometry {
    /// `size_of::<T>()`
    pub object_size: usize,
    pub slots_per_block: usize,
    pub(crate) layout: Layout,
}

impl SlabGeometry {
    pub fn for_type<T>(config: &SlabConfig) -> Result<Self> {
        config.validate()?;

        let object_size = size_of::<T>();
        if object_size == 0 {
            return Err(Error::ZeroSized(std::any::type_name::<T>()));
        }
        let slots_per_block = config.block_bytes / object_size;
        if slots_per_block == 0 {
            return Err(Error::ObjectTooLarge {
                size: object_size,
                capacity: config.block_bytes,
            });
        }
        if slots_per_block > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "{} slots per block exceeds {}",
                slots_per_block,
                u32::MAX
            )));
        }
        let layout = RawBlock::<T>::layout_for(slots_per_block).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "block of {} objects of {} bytes cannot be laid out",
                slots_per_block, object_size
            ))
        })?;

        Ok(Self {
            object_size,
            slots_per_block,
            layout,
        })
    }
}

/// One block of slots
///
/// Free slots are tracked with two cursors instead of a free list:
/// - the frontier: no slot at or above it has been used since it was last
///   lowered,
/// - the free hint: a candidate free slot at or below the frontier, checked
///   against the bitmap before use.
///
/// Reuse therefore leans towards earlier free slots without guaranteeing
/// the lowest one.
pub(crate) struct SlabBlock<T> {
    ordinal: u32,
    storage: RawBlock<T>,
    /// Frontier
    next_empty: usize,
    /// Free hint
    prev_empty: usize,
    used: BitVec,
    live: usize,
}

impl<T> SlabBlock<T> {
    pub(crate) fn new(ordinal: u32, geometry: &SlabGeometry) -> Self {
        let len = geometry.slots_per_block;
        Self {
            ordinal,
            storage: RawBlock::new(len, geometry.layout),
            next_empty: 0,
            prev_empty: 0,
            used: BitVec::repeat(false, len),
            live: 0,
        }
    }

    pub(crate) fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub(crate) fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn frontier(&self) -> usize {
        self.next_empty
    }

    /// The free hint, if it still names a free slot below the frontier
    pub(crate) fn hint(&self) -> Option<usize> {
        let hint = self.prev_empty;
        (hint < self.next_empty && !self.used[hint]).then_some(hint)
    }

    /// Frontier at capacity and no usable hint
    pub(crate) fn is_full(&self) -> bool {
        self.next_empty >= self.capacity() && self.hint().is_none()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub(crate) fn is_used(&self, offset: usize) -> bool {
        self.used.get(offset).map_or(false, |bit| *bit)
    }

    pub(crate) fn slot(&self, offset: usize) -> NonNull<T> {
        self.storage.slot(offset)
    }

    pub(crate) fn base_addr(&self) -> usize {
        self.storage.base_addr()
    }

    pub(crate) fn offset_of(&self, ptr: NonNull<T>) -> Option<usize> {
        self.storage.offset_of(ptr)
    }

    /// Claim a free slot and mark it used; the caller initializes it
    pub(crate) fn allocate(&mut self) -> usize {
        debug_assert!(!self.is_full(), "allocating from full block {}", self.ordinal);

        let offset = match self.hint() {
            Some(hint) => hint,
            None => {
                let frontier = self.next_empty;
                self.next_empty += 1;
                frontier
            }
        };

        let next = offset + 1;
        self.prev_empty = if next < self.next_empty && !self.used[next] {
            next
        } else {
            self.next_empty
        };

        self.used.set(offset, true);
        self.live += 1;
        offset
    }

    /// Mark `offset` free; the caller has already moved the object out
    pub(crate) fn erase(&mut self, offset: usize) {
        debug_assert!(self.is_used(offset), "slot {} already free", offset);

        self.used.set(offset, false);
        self.live -= 1;
        if offset + 1 == self.next_empty {
            self.next_empty = offset;
        }
        self.prev_empty = self.prev_empty.min(offset);
    }
}

impl<T> Drop for SlabBlock<T> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<T>() {
            for offset in self.used.iter_ones() {
                // Safety: set bits mark initialized slots.
                unsafe { std::ptr::drop_in_place(self.storage.slot(offset).as_ptr()) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(slots: usize) -> SlabBlock<u64> {
        let config = SlabConfig {
            block_bytes: slots * 8,
        };
        SlabBlock::new(0, &SlabGeometry::for_type::<u64>(&config).unwrap())
    }

    #[test]
    fn test_sequential_allocation_bumps_frontier() {
        let mut b = block(8);
        for expected in 0..8 {
            assert_eq!(b.allocate(), expected);
            assert_eq!(b.frontier(), expected + 1);
        }
        assert!(b.is_full());
        assert_eq!(b.live(), 8);
    }

    #[test]
    fn test_free_below_frontier_is_reissued() {
        let mut b = block(8);
        for _ in 0..5 {
            b.allocate();
        }
        b.erase(4);
        assert_eq!(b.frontier(), 4);
        assert_eq!(b.allocate(), 4);
        assert_eq!(b.frontier(), 5);
    }

    #[test]
    fn test_hint_prefers_earlier_hole() {
        let mut b = block(8);
        for _ in 0..6 {
            b.allocate();
        }
        b.erase(3);
        b.erase(1);
        assert_eq!(b.frontier(), 6);
        assert_eq!(b.hint(), Some(1));

        assert_eq!(b.allocate(), 1);
        // slot 2 is used, so the hint falls back to the frontier
        assert_eq!(b.hint(), None);
        assert_eq!(b.allocate(), 6);
    }

    #[test]
    fn test_hint_walks_contiguous_holes() {
        let mut b = block(8);
        for _ in 0..6 {
            b.allocate();
        }
        b.erase(2);
        b.erase(3);
        b.erase(1);
        assert_eq!(b.allocate(), 1);
        assert_eq!(b.allocate(), 2);
        assert_eq!(b.allocate(), 3);
        assert_eq!(b.allocate(), 6);
    }

    #[test]
    fn test_full_frontier_with_hole_is_not_full() {
        let mut b = block(4);
        for _ in 0..4 {
            b.allocate();
        }
        b.erase(1);
        assert_eq!(b.frontier(), 4);
        assert!(!b.is_full());
        assert_eq!(b.allocate(), 1);
        assert!(b.is_full());
    }

    #[test]
    fn test_empty_tracks_live_count() {
        let mut b = block(4);
        let a = b.allocate();
        let c = b.allocate();
        b.erase(a);
        assert!(!b.is_empty());
        // frontier retracts only from the top
        assert_eq!(b.frontier(), 2);
        b.erase(c);
        assert!(b.is_empty());
        assert_eq!(b.frontier(), 1);
    }

    #[test]
    fn test_geometry_rejects_oversized() {
        let config = SlabConfig { block_bytes: 16 };
        assert!(matches!(
            SlabGeometry::for_type::<[u8; 32]>(&config),
            Err(Error::ObjectTooLarge { size: 32, capacity: 16 })
        ));
        assert!(matches!(
            SlabGeometry::for_type::<()>(&config),
            Err(Error::ZeroSized(_))
        ));
    }
}
