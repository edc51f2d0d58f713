//! Positional access to a slab heap: slots, cursors and iterators

use super::heap::SlabHeap;
use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::ptr::NonNull;

/// One position of a heap, live or dead
pub struct RawSlot<'a, T> {
    index: usize,
    ptr: Option<NonNull<T>>,
    live: bool,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> RawSlot<'a, T> {
    pub(crate) fn new(index: usize, ptr: Option<NonNull<T>>, live: bool) -> Self {
        Self {
            index,
            ptr,
            live,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Slot address; null when the slot's block is no longer held
    pub fn as_ptr(&self) -> *const T {
        self.ptr
            .map_or(std::ptr::null(), |ptr| ptr.as_ptr() as *const T)
    }

    /// The object, if the slot is live
    pub fn get(&self) -> Option<&'a T> {
        match (self.live, self.ptr) {
            // Safety: live slot of a heap borrowed for 'a.
            (true, Some(ptr)) => Some(unsafe { &*ptr.as_ptr() }),
            _ => None,
        }
    }
}

impl<T> Clone for RawSlot<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RawSlot<'_, T> {}

impl<T> fmt::Debug for RawSlot<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSlot")
            .field("index", &self.index)
            .field("live", &self.live)
            .finish()
    }
}

/// Random-access position into a [`SlabHeap`]
///
/// Supports pointer-style arithmetic. A cursor may sit anywhere, including
/// before the start or past the end; only dereferencing through
/// [`Cursor::slot`] or [`Cursor::at`] requires a position in `0..size()`.
pub struct Cursor<'a, T> {
    heap: &'a SlabHeap<T>,
    pos: isize,
}

impl<'a, T> Cursor<'a, T> {
    pub(crate) fn new(heap: &'a SlabHeap<T>, pos: isize) -> Self {
        Self { heap, pos }
    }

    pub fn position(&self) -> isize {
        self.pos
    }

    /// Position as a heap index
    ///
    /// # Panics
    ///
    /// Panics if the cursor is before the start.
    pub fn index(&self) -> usize {
        match usize::try_from(self.pos) {
            Ok(index) => index,
            Err(_) => panic!("cursor at {} is before the start", self.pos),
        }
    }

    /// Slot under the cursor
    pub fn slot(&self) -> RawSlot<'a, T> {
        self.heap.raw_slot(self.index())
    }

    /// Slot `n` positions away
    pub fn at(&self, n: isize) -> RawSlot<'a, T> {
        (*self + n).slot()
    }

    /// Iterate from this cursor up to, not including, `end`
    pub fn iter_to(self, end: Cursor<'a, T>) -> RawIter<'a, T> {
        assert!(
            std::ptr::eq(self.heap, end.heap),
            "cursors belong to different heaps"
        );
        let front = self.index();
        let back = end.index().max(front);
        RawIter::new(self.heap, front, back)
    }
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<T> fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("pos", &self.pos).finish()
    }
}

impl<T> PartialEq for Cursor<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.heap, other.heap) && self.pos == other.pos
    }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T> PartialOrd for Cursor<'_, T> {
    /// Cursors into different heaps are unordered
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        std::ptr::eq(self.heap, other.heap).then(|| self.pos.cmp(&other.pos))
    }
}

impl<T> Add<isize> for Cursor<'_, T> {
    type Output = Self;

    fn add(mut self, rhs: isize) -> Self {
        self += rhs;
        self
    }
}

impl<T> Sub<isize> for Cursor<'_, T> {
    type Output = Self;

    fn sub(mut self, rhs: isize) -> Self {
        self -= rhs;
        self
    }
}

impl<T> AddAssign<isize> for Cursor<'_, T> {
    fn add_assign(&mut self, rhs: isize) {
        self.pos += rhs;
    }
}

impl<T> SubAssign<isize> for Cursor<'_, T> {
    fn sub_assign(&mut self, rhs: isize) {
        self.pos -= rhs;
    }
}

/// Distance between two cursors of the same heap
impl<'a, T> Sub for Cursor<'a, T> {
    type Output = isize;

    fn sub(self, rhs: Self) -> isize {
        assert!(
            std::ptr::eq(self.heap, rhs.heap),
            "cursors belong to different heaps"
        );
        self.pos - rhs.pos
    }
}

/// Iterator over every slot in a range of a heap, dead ones included
pub struct RawIter<'a, T> {
    heap: &'a SlabHeap<T>,
    front: usize,
    back: usize,
}

impl<'a, T> RawIter<'a, T> {
    pub(crate) fn new(heap: &'a SlabHeap<T>, front: usize, back: usize) -> Self {
        debug_assert!(front <= back);
        Self { heap, front, back }
    }
}

impl<'a, T> Iterator for RawIter<'a, T> {
    type Item = RawSlot<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let slot = self.heap.raw_slot(self.front);
        self.front += 1;
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl<T> DoubleEndedIterator for RawIter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.heap.raw_slot(self.back))
    }
}

impl<T> ExactSizeIterator for RawIter<'_, T> {}

impl<T> FusedIterator for RawIter<'_, T> {}

impl<T> Clone for RawIter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            heap: self.heap,
            front: self.front,
            back: self.back,
        }
    }
}

/// Iterator over live objects and their indices
pub struct LiveIter<'a, T> {
    raw: RawIter<'a, T>,
}

impl<'a, T> LiveIter<'a, T> {
    pub(crate) fn new(raw: RawIter<'a, T>) -> Self {
        Self { raw }
    }
}

impl<'a, T> Iterator for LiveIter<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.raw
            .by_ref()
            .find_map(|slot| slot.get().map(|value| (slot.index(), value)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.raw.size_hint().1)
    }
}

impl<T> DoubleEndedIterator for LiveIter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some(slot) = self.raw.next_back() {
            if let Some(value) = slot.get() {
                return Some((slot.index(), value));
            }
        }
        None
    }
}

impl<T> FusedIterator for LiveIter<'_, T> {}

#[cfg(test)]
mod tests {
    use crate::config::SlabConfig;
    use crate::slab::SlabHeap;

    fn heap_with(values: &[u64]) -> SlabHeap<u64> {
        let mut heap = SlabHeap::with_config(SlabConfig { block_bytes: 32 }).unwrap();
        for &value in values {
            heap.emplace(value);
        }
        heap
    }

    #[test]
    fn test_cursor_arithmetic() {
        let heap = heap_with(&[10, 20, 30, 40, 50]);
        let begin = heap.begin();
        let end = heap.end();

        assert_eq!(end - begin, 5);
        let mut c = begin + 3;
        assert_eq!(c.slot().get(), Some(&40));
        c -= 2;
        assert_eq!(c.index(), 1);
        c += 1;
        assert_eq!(c.at(-2).get(), Some(&10));
        assert_eq!((end - 1).slot().get(), Some(&50));
        assert!(begin < end);
        assert_eq!(begin + 5, end);
    }

    #[test]
    fn test_cursors_of_different_heaps_are_unordered() {
        let a = heap_with(&[1]);
        let b = heap_with(&[1]);
        assert_eq!(a.begin().partial_cmp(&b.begin()), None);
        assert_ne!(a.begin(), b.begin());
    }

    #[test]
    fn test_cursor_range_iteration() {
        let heap = heap_with(&[1, 2, 3, 4, 5, 6]);
        let values: Vec<_> = (heap.begin() + 2)
            .iter_to(heap.end() - 1)
            .filter_map(|slot| slot.get().copied())
            .collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn test_raw_iter_is_exact_and_reversible() {
        let mut heap = heap_with(&[1, 2, 3, 4, 5]);
        heap.erase(2);

        let iter = heap.iter();
        assert_eq!(iter.len(), 5);
        let reversed: Vec<_> = iter.rev().map(|slot| slot.index()).collect();
        assert_eq!(reversed, vec![4, 3, 2, 1, 0]);

        let mut iter = heap.iter();
        let third = iter.nth(2).unwrap();
        assert!(!third.is_live());
        assert_eq!(iter.len(), 2);
        assert!(iter.nth(10).is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_live_iter_skips_dead() {
        let mut heap = heap_with(&[1, 2, 3, 4, 5]);
        heap.erase(0);
        heap.erase(4);

        let forward: Vec<_> = heap.iter_live().map(|(_, v)| *v).collect();
        assert_eq!(forward, vec![2, 3, 4]);
        let backward: Vec<_> = heap.iter_live().rev().map(|(i, _)| i).collect();
        assert_eq!(backward, vec![3, 2, 1]);
    }

    #[test]
    fn test_slot_in_released_block_has_no_pointer() {
        let mut heap = heap_with(&[1, 2, 3, 4, 5]);
        heap.erase(4);

        // index 4 lived alone in the second block, which was released
        assert_eq!(heap.size(), 5);
        let slot = heap.iter().last().unwrap();
        assert_eq!(slot.index(), 4);
        assert!(slot.as_ptr().is_null());
        assert_eq!(slot.get(), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_cursor_past_end_panics_on_deref() {
        let heap = heap_with(&[1]);
        heap.end().slot();
    }
}
