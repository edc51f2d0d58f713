//! Workload targets, one per allocation strategy

use super::{ChurnTarget, Item};
use crate::config::AllocConfig;
use crate::error::Result;
use crate::pool::{ChunkPool, PoolHandle, PoolPtr};
use crate::slab::{SharedSlabHeap, SlabHandle, SlabHeap};
use std::sync::Arc;

fn empty(position: usize) -> ! {
    panic!("position {} is empty", position)
}

/// Plain `Box` allocation, the reference target
pub struct BoxTarget {
    slots: Vec<Option<Box<Item>>>,
}

impl BoxTarget {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
        }
    }
}

impl ChurnTarget for BoxTarget {
    fn label(&self) -> &'static str {
        "box"
    }

    fn insert(&mut self, position: usize, item: Item) {
        self.slots[position] = Some(Box::new(item));
    }

    fn remove(&mut self, position: usize) -> bool {
        self.slots[position].take().is_some()
    }

    fn contains(&self, position: usize) -> bool {
        self.slots[position].is_some()
    }

    fn value(&self, position: usize) -> usize {
        match &self.slots[position] {
            Some(item) => item.val,
            None => empty(position),
        }
    }

    fn value_mut(&mut self, position: usize) -> &mut usize {
        match &mut self.slots[position] {
            Some(item) => &mut item.val,
            None => empty(position),
        }
    }

    fn destroy(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Plain `Arc` allocation
pub struct ArcTarget {
    slots: Vec<Option<Arc<Item>>>,
}

impl ArcTarget {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
        }
    }
}

impl ChurnTarget for ArcTarget {
    fn label(&self) -> &'static str {
        "arc"
    }

    fn insert(&mut self, position: usize, item: Item) {
        self.slots[position] = Some(Arc::new(item));
    }

    fn remove(&mut self, position: usize) -> bool {
        self.slots[position].take().is_some()
    }

    fn contains(&self, position: usize) -> bool {
        self.slots[position].is_some()
    }

    fn value(&self, position: usize) -> usize {
        match &self.slots[position] {
            Some(item) => item.val,
            None => empty(position),
        }
    }

    fn value_mut(&mut self, position: usize) -> &mut usize {
        match &mut self.slots[position] {
            // Only one reference exists, so this never clones.
            Some(item) => &mut Arc::make_mut(item).val,
            None => empty(position),
        }
    }

    fn destroy(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Raw [`ChunkPool`] allocation
pub struct PoolTarget {
    pool: ChunkPool<Item>,
    slots: Vec<Option<PoolPtr<Item>>>,
}

impl PoolTarget {
    pub fn new(count: usize, config: &AllocConfig) -> Result<Self> {
        Ok(Self {
            pool: ChunkPool::with_config(config.pool)?,
            slots: vec![None; count],
        })
    }
}

impl ChurnTarget for PoolTarget {
    fn label(&self) -> &'static str {
        "pool"
    }

    fn insert(&mut self, position: usize, item: Item) {
        self.slots[position] = Some(self.pool.allocate(item));
    }

    fn remove(&mut self, position: usize) -> bool {
        match self.slots[position].take() {
            Some(ptr) => {
                // Safety: each pointer is stored in exactly one slot.
                unsafe { self.pool.free(ptr) };
                true
            }
            None => false,
        }
    }

    fn contains(&self, position: usize) -> bool {
        self.slots[position].is_some()
    }

    fn value(&self, position: usize) -> usize {
        match &self.slots[position] {
            // Safety: live pointer owned by this target.
            Some(ptr) => unsafe { ptr.as_ref() }.val,
            None => empty(position),
        }
    }

    fn value_mut(&mut self, position: usize) -> &mut usize {
        match &mut self.slots[position] {
            // Safety: live pointer owned by this target, borrowed mutably.
            Some(ptr) => &mut unsafe { ptr.as_mut() }.val,
            None => empty(position),
        }
    }

    fn destroy(&mut self) {
        for position in 0..self.slots.len() {
            self.remove(position);
        }
    }
}

impl Drop for PoolTarget {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// [`ChunkPool`] allocation behind reference-counted handles
pub struct PoolSharedTarget {
    pool: ChunkPool<Item>,
    slots: Vec<Option<PoolHandle<Item>>>,
}

impl PoolSharedTarget {
    pub fn new(count: usize, config: &AllocConfig) -> Result<Self> {
        Ok(Self {
            pool: ChunkPool::with_config(config.pool)?,
            slots: (0..count).map(|_| None).collect(),
        })
    }
}

impl ChurnTarget for PoolSharedTarget {
    fn label(&self) -> &'static str {
        "pool-shared"
    }

    fn insert(&mut self, position: usize, item: Item) {
        self.slots[position] = Some(self.pool.allocate_shared(item));
    }

    fn remove(&mut self, position: usize) -> bool {
        self.slots[position].take().is_some()
    }

    fn contains(&self, position: usize) -> bool {
        self.slots[position].is_some()
    }

    fn value(&self, position: usize) -> usize {
        match &self.slots[position] {
            Some(handle) => handle.val,
            None => empty(position),
        }
    }

    fn value_mut(&mut self, position: usize) -> &mut usize {
        let handle = match &mut self.slots[position] {
            Some(handle) => handle,
            None => empty(position),
        };
        match PoolHandle::get_mut(handle) {
            Some(item) => &mut item.val,
            None => panic!("handle at position {} is shared", position),
        }
    }

    fn destroy(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// [`SlabHeap`] allocation, positions mapped to heap indices
pub struct SlabTarget {
    heap: SlabHeap<Item>,
    slots: Vec<Option<usize>>,
}

impl SlabTarget {
    pub fn new(count: usize, config: &AllocConfig) -> Result<Self> {
        Ok(Self {
            heap: SlabHeap::with_config(config.slab)?,
            slots: vec![None; count],
        })
    }
}

impl ChurnTarget for SlabTarget {
    fn label(&self) -> &'static str {
        "slab"
    }

    fn insert(&mut self, position: usize, item: Item) {
        self.slots[position] = Some(self.heap.emplace(item).index);
    }

    fn remove(&mut self, position: usize) -> bool {
        match self.slots[position].take() {
            Some(index) => {
                self.heap.erase(index);
                true
            }
            None => false,
        }
    }

    fn contains(&self, position: usize) -> bool {
        self.slots[position].is_some()
    }

    fn value(&self, position: usize) -> usize {
        match self.slots[position] {
            Some(index) => self.heap[index].val,
            None => empty(position),
        }
    }

    fn value_mut(&mut self, position: usize) -> &mut usize {
        match self.slots[position] {
            Some(index) => &mut self.heap[index].val,
            None => empty(position),
        }
    }

    fn destroy(&mut self) {
        self.heap.clear();
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// [`SharedSlabHeap`] allocation behind reference-counted handles
pub struct SlabSharedTarget {
    heap: SharedSlabHeap<Item>,
    slots: Vec<Option<SlabHandle<Item>>>,
}

impl SlabSharedTarget {
    pub fn new(count: usize, config: &AllocConfig) -> Result<Self> {
        Ok(Self {
            heap: SharedSlabHeap::with_config(config.slab)?,
            slots: (0..count).map(|_| None).collect(),
        })
    }
}

impl ChurnTarget for SlabSharedTarget {
    fn label(&self) -> &'static str {
        "slab-shared"
    }

    fn insert(&mut self, position: usize, item: Item) {
        self.slots[position] = Some(self.heap.make_shared(item));
    }

    fn remove(&mut self, position: usize) -> bool {
        self.slots[position].take().is_some()
    }

    fn contains(&self, position: usize) -> bool {
        self.slots[position].is_some()
    }

    fn value(&self, position: usize) -> usize {
        match &self.slots[position] {
            Some(handle) => handle.val,
            None => empty(position),
        }
    }

    fn value_mut(&mut self, position: usize) -> &mut usize {
        let handle = match &mut self.slots[position] {
            Some(handle) => handle,
            None => empty(position),
        };
        match SlabHandle::get_mut(handle) {
            Some(item) => &mut item.val,
            None => panic!("handle at position {} is shared", position),
        }
    }

    fn destroy(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Every target, reference first
pub fn all_targets(count: usize, config: &AllocConfig) -> Result<Vec<Box<dyn ChurnTarget>>> {
    Ok(vec![
        Box::new(BoxTarget::new(count)),
        Box::new(ArcTarget::new(count)),
        Box::new(PoolTarget::new(count, config)?),
        Box::new(PoolSharedTarget::new(count, config)?),
        Box::new(SlabTarget::new(count, config)?),
        Box::new(SlabSharedTarget::new(count, config)?),
    ])
}
