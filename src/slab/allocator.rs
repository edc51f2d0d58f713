//! Slab allocator implementation

use super::block::{SlabBlock, SlabGeometry};
use super::slot::{Slot, SlotId};
use crate::config::SlabConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::ptr::NonNull;
use tracing::{debug, trace};

/// Single-threaded slab allocator for objects of one type
///
/// Storage comes in fixed-size blocks, each tracking liveness in a bitmap.
/// Every slot has a stable global index
/// (`block ordinal × slots_per_block + offset`) that stays valid for the
/// object's lifetime. Blocks live on a chain; the most recently added block
/// serves allocations, and a block that empties while it serves them is
/// handed back to the system unless it is the only one.
///
/// Dropping the allocator drops every live object.
pub struct SlabAllocator<T> {
    geometry: SlabGeometry,
    /// Ordinal → block, `None` once released
    blocks: Vec<Option<SlabBlock<T>>>,
    /// Block chain in the order blocks were added; the last one is current
    chain: Vec<u32>,
    /// Released ordinals, reused most recent first
    free_ordinals: Vec<u32>,
    /// Block span (base address / block bytes) → ordinal
    ///
    /// Held blocks never overlap, so each span number names at most one
    /// block, and a slot address falls in its block's span or the next.
    by_span: HashMap<usize, u32>,
    live: usize,
}

/// Allocator occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabStats {
    /// Blocks currently held
    pub blocks: usize,
    /// Ordinals ever assigned, released ones included
    pub ordinals: usize,
    pub slots_per_block: usize,
    pub live_objects: usize,
}

impl<T> SlabAllocator<T> {
    /// Create an allocator with the default block size
    pub fn new() -> Result<Self> {
        Self::with_config(SlabConfig::default())
    }

    /// Create an allocator with a custom block size
    ///
    /// The first block is allocated immediately.
    pub fn with_config(config: SlabConfig) -> Result<Self> {
        let geometry = SlabGeometry::for_type::<T>(&config)?;

        debug!(
            object_size = geometry.object_size,
            slots_per_block = geometry.slots_per_block,
            "Creating slab allocator for {}",
            std::any::type_name::<T>()
        );

        let mut allocator = Self {
            geometry,
            blocks: Vec::new(),
            chain: Vec::new(),
            free_ordinals: Vec::new(),
            by_span: HashMap::new(),
            live: 0,
        };
        allocator.push_block();
        Ok(allocator)
    }

    /// Move `value` into a free slot
    pub fn allocate(&mut self, value: T) -> Slot<T> {
        if self.current().is_full() {
            self.push_block();
        }

        let block = self.current_mut();
        let ordinal = block.ordinal();
        let offset = block.allocate();
        let ptr = block.slot(offset);
        // Safety: the slot was free and is now marked used.
        unsafe { ptr.as_ptr().write(value) };
        self.live += 1;

        let id = SlotId::new(ordinal, offset as u32);
        let index = id.index(self.geometry.slots_per_block);
        trace!(%id, index, "Allocated slab slot");
        Slot::new(index, id, ptr)
    }

    /// Drop the object at `index` and free its slot
    ///
    /// # Panics
    ///
    /// Panics if `index` does not name a live object.
    pub fn free(&mut self, index: usize) {
        drop(self.take(index));
    }

    /// Move the object at `index` out and free its slot
    ///
    /// # Panics
    ///
    /// Panics if `index` does not name a live object.
    pub fn take(&mut self, index: usize) -> T {
        let id = self.slot_id(index);
        let block = match self.block_mut(id.block_index()) {
            Some(block) if block.is_used(id.offset as usize) => block,
            _ => panic!("slab index {} is not a live object", index),
        };

        let offset = id.offset as usize;
        // Safety: the bitmap marks the slot initialized; it is cleared
        // right after, so the value is read exactly once.
        let value = unsafe { block.slot(offset).as_ptr().read() };
        block.erase(offset);
        self.live -= 1;
        trace!(%id, index, "Freed slab slot");

        self.release_if_drained(id.block);
        value
    }

    /// Drop the object at `ptr` and free its slot
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point at a live object of this allocator.
    pub fn free_ptr(&mut self, ptr: *const T) {
        match self.index_of(ptr) {
            Some(index) => self.free(index),
            None => panic!("pointer {:p} was not issued by this allocator", ptr),
        }
    }

    /// Global index of the slot at `ptr`
    ///
    /// Returns `None` if `ptr` is not a slot address of a block this
    /// allocator currently holds. The slot need not be live.
    pub fn index_of(&self, ptr: *const T) -> Option<usize> {
        let ptr = NonNull::new(ptr as *mut T)?;
        let span = ptr.as_ptr() as usize / self.geometry.layout.size();
        [Some(span), span.checked_sub(1)]
            .into_iter()
            .flatten()
            .find_map(|span| {
                let &ordinal = self.by_span.get(&span)?;
                let offset = self.block(ordinal as usize)?.offset_of(ptr)?;
                Some(SlotId::new(ordinal, offset as u32).index(self.geometry.slots_per_block))
            })
    }

    /// Address of the slot at `index`, live or not
    ///
    /// Returns `None` when the index falls in a released or never-allocated
    /// block.
    pub fn ptr(&self, index: usize) -> Option<NonNull<T>> {
        let id = self.slot_id(index);
        self.block(id.block_index())
            .map(|block| block.slot(id.offset as usize))
    }

    pub fn contains(&self, index: usize) -> bool {
        let id = self.slot_id(index);
        self.block(id.block_index())
            .map_or(false, |block| block.is_used(id.offset as usize))
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        let id = self.slot_id(index);
        let block = self.block(id.block_index())?;
        let offset = id.offset as usize;
        // Safety: live slot, shared borrow of the allocator.
        block
            .is_used(offset)
            .then(|| unsafe { &*block.slot(offset).as_ptr() })
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let id = self.slot_id(index);
        let block = self.block_mut(id.block_index())?;
        let offset = id.offset as usize;
        // Safety: live slot, exclusive borrow of the allocator.
        block
            .is_used(offset)
            .then(|| unsafe { &mut *block.slot(offset).as_ptr() })
    }

    /// Live objects
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Blocks currently held
    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    pub fn slots_per_block(&self) -> usize {
        self.geometry.slots_per_block
    }

    pub fn geometry(&self) -> &SlabGeometry {
        &self.geometry
    }

    pub fn stats(&self) -> SlabStats {
        SlabStats {
            blocks: self.chain.len(),
            ordinals: self.blocks.len(),
            slots_per_block: self.geometry.slots_per_block,
            live_objects: self.live,
        }
    }

    /// Drop every live object and return to a single fresh block
    ///
    /// Indices issued afterwards start again from 0.
    pub fn clear(&mut self) {
        debug!(
            blocks = self.chain.len(),
            live = self.live,
            "Clearing slab allocator"
        );
        self.chain.clear();
        self.free_ordinals.clear();
        self.by_span.clear();
        self.live = 0;
        self.blocks.clear();
        self.push_block();
    }

    fn slot_id(&self, index: usize) -> SlotId {
        let spb = self.geometry.slots_per_block;
        let block = index / spb;
        if block > u32::MAX as usize {
            // Past any ordinal this allocator can hand out.
            return SlotId::new(u32::MAX, 0);
        }
        SlotId::from_index(index, spb)
    }

    fn block(&self, ordinal: usize) -> Option<&SlabBlock<T>> {
        self.blocks.get(ordinal).and_then(Option::as_ref)
    }

    fn block_mut(&mut self, ordinal: usize) -> Option<&mut SlabBlock<T>> {
        self.blocks.get_mut(ordinal).and_then(Option::as_mut)
    }

    fn span_of(&self, block: &SlabBlock<T>) -> usize {
        block.base_addr() / self.geometry.layout.size()
    }

    fn current(&self) -> &SlabBlock<T> {
        match self.chain.last().and_then(|&ordinal| self.block(ordinal as usize)) {
            Some(block) => block,
            None => unreachable!("slab chain is never empty"),
        }
    }

    fn current_mut(&mut self) -> &mut SlabBlock<T> {
        let ordinal = match self.chain.last() {
            Some(&ordinal) => ordinal as usize,
            None => unreachable!("slab chain is never empty"),
        };
        match self.block_mut(ordinal) {
            Some(block) => block,
            None => unreachable!("chained block {} was released", ordinal),
        }
    }

    fn push_block(&mut self) {
        let ordinal = match self.free_ordinals.pop() {
            Some(ordinal) => ordinal,
            None => {
                let next = self.blocks.len();
                assert!(next < u32::MAX as usize, "slab block ordinals exhausted");
                self.blocks.push(None);
                next as u32
            }
        };

        let block = SlabBlock::new(ordinal, &self.geometry);
        let span = self.span_of(&block);
        self.by_span.insert(span, ordinal);
        debug!(
            ordinal,
            bytes = self.geometry.layout.size(),
            "Allocated slab block"
        );
        self.blocks[ordinal as usize] = Some(block);
        self.chain.push(ordinal);
    }

    /// Release the current block if it just drained and is not the only one
    fn release_if_drained(&mut self, ordinal: u32) {
        if self.chain.len() < 2 || self.chain.last() != Some(&ordinal) {
            return;
        }
        let drained = self
            .block(ordinal as usize)
            .map_or(false, SlabBlock::is_empty);
        if !drained {
            return;
        }

        self.chain.pop();
        if let Some(block) = self.blocks[ordinal as usize].take() {
            let span = self.span_of(&block);
            self.by_span.remove(&span);
        }
        self.free_ordinals.push(ordinal);
        debug!(ordinal, "Released drained slab block");
    }
}
