//! Reference-counted handles to objects in a shared slab heap

use super::block::SlabGeometry;
use super::heap::SlabHeap;
use crate::config::SlabConfig;
use crate::error::Result;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::rc::Rc;

/// A [`SlabHeap`] whose objects are handed out behind [`SlabHandle`]s
///
/// Single-threaded like the heap itself. Each handle keeps the heap alive,
/// and dropping the last clone of a handle erases its object.
///
/// # Example
/// ```
/// use churnpool::slab::SharedSlabHeap;
///
/// let heap = SharedSlabHeap::<u64>::new().unwrap();
/// let a = heap.make_shared(7);
/// assert_eq!(*a, 7);
/// assert_eq!(heap.len(), 1);
/// drop(a);
/// assert!(heap.is_empty());
/// ```
pub struct SharedSlabHeap<T> {
    heap: Rc<RefCell<SlabHeap<T>>>,
}

/// Shared handle to an object in a [`SharedSlabHeap`]
pub struct SlabHandle<T> {
    shared: Rc<Shared<T>>,
}

struct Shared<T> {
    heap: Rc<RefCell<SlabHeap<T>>>,
    index: usize,
    ptr: NonNull<T>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let value = self.heap.borrow_mut().take(self.index);
        // Dropped with the heap unborrowed so `T::drop` may use it.
        drop(value);
    }
}

impl<T> SharedSlabHeap<T> {
    pub fn new() -> Result<Self> {
        Self::with_config(SlabConfig::default())
    }

    pub fn with_config(config: SlabConfig) -> Result<Self> {
        Ok(Self {
            heap: Rc::new(RefCell::new(SlabHeap::with_config(config)?)),
        })
    }

    /// Move `value` into the heap behind a handle
    pub fn make_shared(&self, value: T) -> SlabHandle<T> {
        let slot = self.heap.borrow_mut().emplace(value);
        SlabHandle {
            shared: Rc::new(Shared {
                heap: Rc::clone(&self.heap),
                index: slot.index,
                ptr: slot.as_non_null(),
            }),
        }
    }

    /// Live objects
    pub fn len(&self) -> usize {
        self.heap.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.borrow().is_empty()
    }

    /// One past the highest index ever issued
    pub fn size(&self) -> usize {
        self.heap.borrow().size()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.heap.borrow().contains(index)
    }

    pub fn geometry(&self) -> SlabGeometry {
        *self.heap.borrow().allocator().geometry()
    }

    /// Run `f` against the underlying heap
    ///
    /// # Panics
    ///
    /// Panics if a handle of this heap is dropped inside `f`.
    pub fn with_heap<R>(&self, f: impl FnOnce(&SlabHeap<T>) -> R) -> R {
        f(&self.heap.borrow())
    }
}

impl<T> fmt::Debug for SharedSlabHeap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heap = self.heap.borrow();
        f.debug_struct("SharedSlabHeap")
            .field("len", &heap.len())
            .field("size", &heap.size())
            .finish()
    }
}

impl<T> SlabHandle<T> {
    /// Heap index of the object
    pub fn index(this: &Self) -> usize {
        this.shared.index
    }

    /// Mutable access when this is the only handle to the object
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        Rc::get_mut(&mut this.shared).map(|shared| {
            // Safety: unique handle, the slot stays live until it drops.
            unsafe { &mut *shared.ptr.as_ptr() }
        })
    }

    /// Number of handles sharing the object
    pub fn strong_count(this: &Self) -> usize {
        Rc::strong_count(&this.shared)
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.shared, &other.shared)
    }
}

impl<T> Deref for SlabHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the slot is live and its block held while any handle exists.
        unsafe { &*self.shared.ptr.as_ptr() }
    }
}

impl<T> Clone for SlabHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SlabHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
