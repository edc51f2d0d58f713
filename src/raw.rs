//! Backing memory for pool and slab blocks

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

/// One block of uninitialized `T` slots obtained from the system allocator.
///
/// The block never moves once allocated, so pointers into it stay valid
/// until the block is dropped. Exhaustion of the system allocator is fatal
/// and goes through [`handle_alloc_error`]. Dropping the block releases the
/// memory without running any destructor; owners drop live objects first.
pub(crate) struct RawBlock<T> {
    base: NonNull<T>,
    len: usize,
    layout: Layout,
    _marker: PhantomData<T>,
}

// Safety: the block owns its slots exclusively; callers hand out access
// to individual slots under their own synchronization.
unsafe impl<T: Send> Send for RawBlock<T> {}

impl<T> RawBlock<T> {
    /// Layout of a block holding `len` slots, `None` on overflow
    pub(crate) fn layout_for(len: usize) -> Option<Layout> {
        if size_of::<T>() == 0 || len == 0 {
            return None;
        }
        Layout::array::<T>(len).ok()
    }

    /// Allocate a block; `layout` must come from [`RawBlock::layout_for`]
    pub(crate) fn new(len: usize, layout: Layout) -> Self {
        debug_assert_eq!(Self::layout_for(len), Some(layout));
        // Safety: layout_for rejects zero-sized layouts.
        let raw = unsafe { alloc(layout) };
        let base = match NonNull::new(raw.cast::<T>()) {
            Some(base) => base,
            None => handle_alloc_error(layout),
        };
        Self {
            base,
            len,
            layout,
            _marker: PhantomData,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Pointer to slot `offset`
    #[inline]
    pub(crate) fn slot(&self, offset: usize) -> NonNull<T> {
        assert!(
            offset < self.len,
            "slot offset {} out of range for block of {}",
            offset,
            self.len
        );
        // Safety: offset is within the allocation.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Start address, used to key blocks by address range
    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Offset of `ptr` inside this block, if it addresses one of its slots
    pub(crate) fn offset_of(&self, ptr: NonNull<T>) -> Option<usize> {
        let addr = ptr.as_ptr() as usize;
        let base = self.base_addr();
        if addr < base || addr % align_of::<T>() != 0 {
            return None;
        }
        let delta = addr - base;
        if delta % size_of::<T>() != 0 {
            return None;
        }
        let offset = delta / size_of::<T>();
        (offset < self.len).then_some(offset)
    }
}

impl<T> Drop for RawBlock<T> {
    fn drop(&mut self) {
        // Safety: allocated in `new` with the same layout.
        unsafe { dealloc(self.base.as_ptr().cast::<u8>(), self.layout) }
    }
}
