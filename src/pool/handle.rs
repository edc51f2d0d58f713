//! Reference-counted handles to pooled objects

use super::chunk_pool::{PoolInner, PoolPtr};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Shared handle to an object in a [`ChunkPool`](super::ChunkPool)
///
/// Behaves like an `Arc<T>` whose storage lives in the pool. The handle
/// holds the pool's shared state and the object's identity; when the last
/// clone is dropped the pool's release path runs on the dropping thread,
/// destroying the object and recycling its chunk if it became empty.
pub struct PoolHandle<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    pool: Arc<PoolInner<T>>,
    ptr: PoolPtr<T>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Safety: `ptr` was allocated from `pool` and is owned by this handle.
        unsafe { self.pool.release(self.ptr) }
    }
}

impl<T> PoolHandle<T> {
    pub(crate) fn new(pool: Arc<PoolInner<T>>, ptr: PoolPtr<T>) -> Self {
        Self {
            shared: Arc::new(Shared { pool, ptr }),
        }
    }

    /// Mutable access when this is the only handle to the object
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        Arc::get_mut(&mut this.shared).map(|shared| {
            // Safety: unique handle, object is live until the handle drops.
            unsafe { shared.ptr.as_mut() }
        })
    }

    /// Number of handles sharing the object
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.shared)
    }

    /// Whether two handles point at the same object
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.shared, &other.shared)
    }

    pub fn as_ptr(this: &Self) -> *const T {
        this.shared.ptr.as_ptr()
    }
}

impl<T> Deref for PoolHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the object lives as long as any handle does.
        unsafe { self.shared.ptr.as_ref() }
    }
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> AsRef<T> for PoolHandle<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: fmt::Debug> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: fmt::Display> fmt::Display for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}
