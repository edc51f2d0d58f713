//! Chunk pool implementation

use super::chunk::{ChunkGeometry, ChunkHeader, ChunkId, CHUNK_HEADER_BYTES};
use super::handle::PoolHandle;
use crate::config::PoolConfig;
use crate::error::Result;
use crate::raw::RawBlock;
#[cfg(debug_assertions)]
use bitvec::vec::BitVec;
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Thread-safe pool allocator for objects of type `T`
///
/// Cheap O(1) allocation by bumping through fixed-size chunks; see the
/// [module docs](super) for the chunk chain. Results are either raw
/// [`PoolPtr`]s released with [`ChunkPool::free`], or reference-counted
/// [`PoolHandle`]s that release themselves.
///
/// # Example
/// ```
/// use churnpool::ChunkPool;
///
/// let pool = ChunkPool::<String>::new().unwrap();
/// let handle = pool.allocate_shared("hello".to_string());
/// assert_eq!(handle.as_str(), "hello");
/// drop(handle); // slot goes back to the pool
/// ```
pub struct ChunkPool<T> {
    inner: Arc<PoolInner<T>>,
}

/// State shared between a pool and its handles
pub(crate) struct PoolInner<T> {
    id: u32,
    geometry: ChunkGeometry,
    state: Mutex<PoolState<T>>,
}

struct PoolState<T> {
    /// Backing blocks, in allocation order
    blocks: Vec<RawBlock<T>>,
    /// Chunk headers, indexed by `ChunkId`
    chunks: Vec<ChunkHeader>,
    /// Chunk currently bump-allocated from
    current: ChunkId,
    /// One bit per slot of every chunk, set while the slot is live
    #[cfg(debug_assertions)]
    live: BitVec,
}

/// Raw pointer to an object living in a [`ChunkPool`]
///
/// Carries the identity of its pool and chunk so the pool can release it
/// without any address arithmetic. Like a raw pointer it is `Copy` and
/// does not keep the pool alive.
pub struct PoolPtr<T> {
    ptr: NonNull<T>,
    pool: u32,
    chunk: ChunkId,
    slot: u32,
}

/// Pool occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub blocks: usize,
    pub chunks: usize,
    pub objects_per_chunk: usize,
    pub live_objects: usize,
    /// Chunks queued after the current one, fresh or recycled
    pub ready_chunks: usize,
}

impl<T> ChunkPool<T> {
    /// Create a pool with the default chunk geometry
    pub fn new() -> Result<Self> {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with custom chunk and block sizes
    ///
    /// The first block is allocated immediately.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        let geometry = ChunkGeometry::for_type::<T>(&config)?;
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        debug!(
            pool = id,
            object_size = geometry.object_size,
            objects_per_chunk = geometry.objects_per_chunk,
            chunks_per_block = geometry.chunks_per_block,
            "Creating chunk pool for {}",
            std::any::type_name::<T>()
        );

        let mut state = PoolState {
            blocks: Vec::new(),
            chunks: Vec::new(),
            current: ChunkId::new(0),
            #[cfg(debug_assertions)]
            live: BitVec::new(),
        };
        state.current = state.alloc_block(id, &geometry);

        Ok(Self {
            inner: Arc::new(PoolInner {
                id,
                geometry,
                state: Mutex::new(state),
            }),
        })
    }

    /// Move `value` into the pool and return a raw pointer to it
    ///
    /// The object stays alive until passed to [`ChunkPool::free`].
    pub fn allocate(&self, value: T) -> PoolPtr<T> {
        let ptr = self.inner.reserve();
        // Safety: the slot was just reserved and nobody else can reach it.
        unsafe { ptr.ptr.as_ptr().write(value) };
        ptr
    }

    /// Move `value` into the pool behind a reference-counted handle
    ///
    /// Dropping the last clone of the handle drops the object and returns
    /// its slot, on whichever thread that happens.
    pub fn allocate_shared(&self, value: T) -> PoolHandle<T> {
        let ptr = self.allocate(value);
        PoolHandle::new(Arc::clone(&self.inner), ptr)
    }

    /// Drop the object behind `ptr` and return its slot to the pool
    ///
    /// # Safety
    /// - `ptr` must have been returned by [`ChunkPool::allocate`] on this
    ///   pool and must not have been freed already.
    /// - No reference obtained through `ptr` may be used afterwards.
    ///
    /// Foreign pointers are caught by debug assertions only; in release
    /// builds they corrupt the pool.
    pub unsafe fn free(&self, ptr: PoolPtr<T>) {
        self.inner.release(ptr);
    }

    /// Whether `ptr` was issued by this pool
    pub fn owns(&self, ptr: &PoolPtr<T>) -> bool {
        ptr.pool == self.inner.id
    }

    /// Number of blocks obtained from the system allocator
    pub fn block_count(&self) -> usize {
        self.inner.state.lock().blocks.len()
    }

    pub fn geometry(&self) -> &ChunkGeometry {
        &self.inner.geometry
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let geometry = &self.inner.geometry;

        let live_bytes: usize = state
            .chunks
            .iter()
            .map(|chunk| chunk.used - CHUNK_HEADER_BYTES)
            .sum();

        let mut ready_chunks = 0;
        let mut cursor = state.chunks[state.current.index()].next;
        while let Some(chunk) = cursor {
            ready_chunks += 1;
            debug_assert!(ready_chunks <= state.chunks.len(), "cycle in chunk chain");
            if ready_chunks > state.chunks.len() {
                break;
            }
            cursor = state.chunks[chunk.index()].next;
        }

        PoolStats {
            blocks: state.blocks.len(),
            chunks: state.chunks.len(),
            objects_per_chunk: geometry.objects_per_chunk as usize,
            live_objects: live_bytes / geometry.object_size,
            ready_chunks,
        }
    }
}

impl<T> fmt::Debug for ChunkPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkPool")
            .field("id", &self.inner.id)
            .field("geometry", &self.inner.geometry)
            .finish()
    }
}

impl<T> PoolInner<T> {
    /// Claim the next free slot under the pool lock
    fn reserve(&self) -> PoolPtr<T> {
        let mut state = self.state.lock();
        state.reserve(self.id, &self.geometry)
    }

    /// Release entry point shared by `free` and handle drops
    ///
    /// # Safety
    /// `ptr` must be live in this pool and not released before.
    pub(crate) unsafe fn release(&self, ptr: PoolPtr<T>) {
        debug_assert_eq!(ptr.pool, self.id, "pointer was issued by another pool");
        #[cfg(debug_assertions)]
        self.state.lock().retire(&ptr, &self.geometry);

        // The destructor runs unlocked so a `T` that frees into this pool
        // from its own `Drop` cannot deadlock.
        std::ptr::drop_in_place(ptr.ptr.as_ptr());

        self.state.lock().reclaim(ptr.chunk, &self.geometry);
    }
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug!(
            pool = self.id,
            blocks = state.blocks.len(),
            "Releasing chunk pool"
        );
    }
}

impl<T> PoolState<T> {
    /// Allocate a block and chain its chunks in order
    fn alloc_block(&mut self, pool: u32, geometry: &ChunkGeometry) -> ChunkId {
        let block = self.blocks.len();
        self.blocks
            .push(RawBlock::new(geometry.block_slots(), geometry.layout));

        let first = self.chunks.len();
        let count = geometry.chunks_per_block;
        for i in 0..count {
            let next = (i + 1 < count).then(|| ChunkId::new(first + i + 1));
            self.chunks.push(ChunkHeader::new(next));
        }
        #[cfg(debug_assertions)]
        self.live
            .resize(self.chunks.len() * geometry.objects_per_chunk as usize, false);

        debug!(
            pool,
            block,
            bytes = geometry.layout.size(),
            "Allocated pool block"
        );
        ChunkId::new(first)
    }

    fn reserve(&mut self, pool: u32, geometry: &ChunkGeometry) -> PoolPtr<T> {
        let current = self.current;
        if self.chunks[current.index()].head == geometry.objects_per_chunk {
            self.current = match self.chunks[current.index()].next {
                Some(next) => next,
                None => {
                    let first = self.alloc_block(pool, geometry);
                    self.chunks[current.index()].next = Some(first);
                    first
                }
            };
        }

        let chunk = self.current;
        let header = &mut self.chunks[chunk.index()];
        debug_assert!(
            header.head < geometry.objects_per_chunk,
            "{} in chain is not empty",
            chunk
        );
        let slot = header.head;
        header.head += 1;
        header.used += geometry.object_size;
        #[cfg(debug_assertions)]
        self.live.set(live_bit(chunk, slot, geometry), true);

        let block = &self.blocks[chunk.block(geometry.chunks_per_block)];
        PoolPtr {
            ptr: block.slot(geometry.block_offset(chunk, slot)),
            pool,
            chunk,
            slot,
        }
    }

    /// Account for one released object in `chunk`
    fn reclaim(&mut self, chunk: ChunkId, geometry: &ChunkGeometry) {
        let current = self.current;
        let after_current = self.chunks[current.index()].next;

        let header = &mut self.chunks[chunk.index()];
        debug_assert!(
            header.used >= CHUNK_HEADER_BYTES + geometry.object_size,
            "{} has no live objects",
            chunk
        );
        header.used -= geometry.object_size;
        if !header.is_empty() {
            return;
        }

        header.head = 0;
        if chunk == current {
            trace!(%chunk, "Current chunk emptied, rewinding");
            return;
        }

        // Most recently emptied chunk is consumed next
        header.next = after_current;
        self.chunks[current.index()].next = Some(chunk);
        trace!(%chunk, after = %current, "Recycled empty chunk");
    }

    /// Check that `ptr` is live and mark its slot released
    #[cfg(debug_assertions)]
    fn retire(&mut self, ptr: &PoolPtr<T>, geometry: &ChunkGeometry) {
        assert!(
            self.issued(ptr, geometry),
            "{} slot {} was not issued by this pool",
            ptr.chunk,
            ptr.slot
        );
        let bit = live_bit(ptr.chunk, ptr.slot, geometry);
        assert!(
            self.live[bit],
            "{} slot {} was already released",
            ptr.chunk,
            ptr.slot
        );
        self.live.set(bit, false);
    }

    #[cfg(debug_assertions)]
    fn issued(&self, ptr: &PoolPtr<T>, geometry: &ChunkGeometry) -> bool {
        let Some(header) = self.chunks.get(ptr.chunk.index()) else {
            return false;
        };
        if ptr.slot >= header.head {
            return false;
        }
        let block = &self.blocks[ptr.chunk.block(geometry.chunks_per_block)];
        block.slot(geometry.block_offset(ptr.chunk, ptr.slot)) == ptr.ptr
    }
}

#[cfg(debug_assertions)]
fn live_bit(chunk: ChunkId, slot: u32, geometry: &ChunkGeometry) -> usize {
    chunk.index() * geometry.objects_per_chunk as usize + slot as usize
}

impl<T> PoolPtr<T> {
    /// Raw pointer to the object
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub fn as_non_null(&self) -> NonNull<T> {
        self.ptr
    }

    /// Chunk holding the object
    pub fn chunk(&self) -> ChunkId {
        self.chunk
    }

    /// Borrow the object
    ///
    /// # Safety
    /// The object must not have been freed, its pool must still be alive,
    /// and no mutable reference to it may exist for `'a`.
    pub unsafe fn as_ref<'a>(&self) -> &'a T {
        &*self.ptr.as_ptr()
    }

    /// Mutably borrow the object
    ///
    /// # Safety
    /// As [`PoolPtr::as_ref`], and no other reference to the object may
    /// exist for `'a`.
    pub unsafe fn as_mut<'a>(&mut self) -> &'a mut T {
        &mut *self.ptr.as_ptr()
    }
}

// Safety: a `PoolPtr` is an address plus bookkeeping ids; every access
// through it is `unsafe` and bound by the caller's contract.
unsafe impl<T: Send> Send for PoolPtr<T> {}
unsafe impl<T: Sync> Sync for PoolPtr<T> {}

impl<T> Clone for PoolPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PoolPtr<T> {}

impl<T> PartialEq for PoolPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.pool == other.pool
    }
}

impl<T> Eq for PoolPtr<T> {}

impl<T> Hash for PoolPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
        self.pool.hash(state);
    }
}

impl<T> fmt::Debug for PoolPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolPtr")
            .field("ptr", &self.ptr)
            .field("pool", &self.pool)
            .field("chunk", &self.chunk)
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    fn small_config() -> PoolConfig {
        // 4 chunks per block, (256 - header) / 8 objects per chunk for u64
        PoolConfig {
            chunk_bytes: 256,
            chunks_per_block: 4,
        }
    }

    #[test]
    fn test_fresh_pool_has_one_block() -> Result<()> {
        let pool = ChunkPool::<u64>::new()?;
        let stats = pool.stats();
        assert_eq!(stats.blocks, 1);
        assert_eq!(stats.chunks, 32);
        assert_eq!(stats.live_objects, 0);
        assert_eq!(stats.ready_chunks, 31);
        Ok(())
    }

    #[test]
    fn test_allocate_and_free() -> Result<()> {
        let pool = ChunkPool::<u64>::new()?;
        let mut ptr = pool.allocate(7);

        assert!(pool.owns(&ptr));
        unsafe {
            assert_eq!(*ptr.as_ref(), 7);
            *ptr.as_mut() = 8;
            assert_eq!(*ptr.as_ref(), 8);
        }
        assert_eq!(pool.stats().live_objects, 1);

        unsafe { pool.free(ptr) };
        assert_eq!(pool.stats().live_objects, 0);
        Ok(())
    }

    #[test]
    fn test_live_pointers_are_distinct() -> Result<()> {
        let pool = ChunkPool::<u64>::with_config(small_config())?;
        let per_block = pool.geometry().block_slots();

        let ptrs: Vec<_> = (0..per_block * 3).map(|i| pool.allocate(i as u64)).collect();
        let addrs: HashSet<usize> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();
        assert_eq!(addrs.len(), ptrs.len());
        assert_eq!(pool.block_count(), 3);

        for (i, p) in ptrs.iter().enumerate() {
            assert_eq!(unsafe { *p.as_ref() }, i as u64);
        }
        for p in ptrs {
            unsafe { pool.free(p) };
        }
        Ok(())
    }

    #[test]
    fn test_full_block_round_trip_restores_fresh_state() -> Result<()> {
        let pool = ChunkPool::<u64>::with_config(small_config())?;
        let fresh = pool.stats();
        let per_block = pool.geometry().block_slots();

        for _ in 0..10 {
            let ptrs: Vec<_> = (0..per_block).map(|i| pool.allocate(i as u64)).collect();
            assert_eq!(pool.block_count(), 1);
            for p in ptrs {
                unsafe { pool.free(p) };
            }
            assert_eq!(pool.stats(), fresh);
        }
        Ok(())
    }

    #[test]
    fn test_emptied_chunk_is_consumed_next() -> Result<()> {
        let pool = ChunkPool::<u64>::with_config(small_config())?;
        let per_chunk = pool.geometry().objects_per_chunk as usize;

        // Fill chunk 0 and start chunk 1
        let first: Vec<_> = (0..per_chunk).map(|i| pool.allocate(i as u64)).collect();
        let second = pool.allocate(100);
        assert_eq!(second.chunk(), ChunkId::new(1));

        for p in first {
            unsafe { pool.free(p) };
        }

        // Fill the rest of chunk 1, the next allocation lands in chunk 0
        let rest: Vec<_> = (1..per_chunk).map(|i| pool.allocate(i as u64)).collect();
        assert!(rest.iter().all(|p| p.chunk() == ChunkId::new(1)));
        let recycled = pool.allocate(200);
        assert_eq!(recycled.chunk(), ChunkId::new(0));
        Ok(())
    }

    #[test]
    fn test_current_chunk_rewinds_in_place() -> Result<()> {
        let pool = ChunkPool::<u64>::with_config(small_config())?;
        let a = pool.allocate(1);
        let b = pool.allocate(2);
        unsafe {
            pool.free(a);
            pool.free(b);
        }
        let c = pool.allocate(3);
        assert_eq!(c.as_ptr(), a.as_ptr());
        assert_eq!(pool.stats().ready_chunks, 3);
        Ok(())
    }

    #[test]
    fn test_balanced_churn_does_not_grow() -> Result<()> {
        let pool = ChunkPool::<u64>::with_config(small_config())?;
        let window = 2 * pool.geometry().objects_per_chunk as usize;
        let mut live = std::collections::VecDeque::new();

        for step in 0..10_000u64 {
            live.push_back(pool.allocate(step));
            if live.len() > window {
                let oldest = live.pop_front().unwrap();
                unsafe { pool.free(oldest) };
            }
        }
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.stats().live_objects, window);
        Ok(())
    }

    #[test]
    fn test_destructor_runs_on_free() -> Result<()> {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }
        // Tracked is zero-sized; pad it
        struct Padded(#[allow(dead_code)] u64, Tracked);

        let pool = ChunkPool::<Padded>::new()?;
        let ptr = pool.allocate(Padded(0, Tracked));
        assert_eq!(DROPS.load(Ordering::SeqCst), 0);
        unsafe { pool.free(ptr) };
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_destructor_may_free_into_same_pool() -> Result<()> {
        struct Node {
            value: u64,
            child: Option<PoolHandle<Node>>,
        }

        let pool = ChunkPool::<Node>::new()?;
        let child = pool.allocate_shared(Node {
            value: 1,
            child: None,
        });
        let parent = pool.allocate_shared(Node {
            value: 2,
            child: Some(child),
        });
        assert_eq!(parent.value, 2);
        assert_eq!(parent.child.as_ref().map(|c| c.value), Some(1));
        assert_eq!(pool.stats().live_objects, 2);

        drop(parent);
        assert_eq!(pool.stats().live_objects, 0);
        Ok(())
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already released")]
    fn test_double_free_caught_in_debug() {
        let pool = ChunkPool::<u64>::new().unwrap();
        let a = pool.allocate(1);
        let _b = pool.allocate(2);
        unsafe {
            pool.free(a);
            pool.free(a);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_double_free_leaves_neighbours_intact() -> Result<()> {
        use std::panic::AssertUnwindSafe;

        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Counted(u64);
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let pool = ChunkPool::<Counted>::new()?;
        let a = pool.allocate(Counted(1));
        let b = pool.allocate(Counted(2));
        unsafe { pool.free(a) };
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);

        let again = std::panic::catch_unwind(AssertUnwindSafe(|| unsafe { pool.free(a) }));
        assert!(again.is_err());
        // Rejected before the destructor ran, and b's chunk was not rewound
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().live_objects, 1);

        let c = pool.allocate(Counted(3));
        assert_ne!(c.as_ptr(), b.as_ptr());
        assert_eq!(unsafe { b.as_ref() }.0, 2);
        unsafe {
            pool.free(b);
            pool.free(c);
        }
        assert_eq!(pool.stats().live_objects, 0);
        Ok(())
    }

    #[test]
    fn test_zero_sized_pool_rejected() {
        assert!(ChunkPool::<()>::new().is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "another pool")]
    fn test_foreign_pointer_caught_in_debug() {
        let a = ChunkPool::<u64>::new().unwrap();
        let b = ChunkPool::<u64>::new().unwrap();
        let ptr = a.allocate(1);
        assert!(!b.owns(&ptr));
        unsafe { b.free(ptr) };
    }
}
