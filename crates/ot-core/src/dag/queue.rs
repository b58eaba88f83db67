//! Min-queue ordered by a caller-supplied comparator.
//!
//! Commit ids are ordered by a runtime comparator rather than `Ord`, so each
//! heap slot carries a shared handle to it. Equal elements pop in insertion
//! order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

struct Slot<T, F> {
    item: T,
    seq: u64,
    compare: Arc<F>,
}

impl<T, F> Ord for Slot<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        (self.compare)(&other.item, &self.item).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T, F> PartialOrd for Slot<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, F> PartialEq for Slot<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, F> Eq for Slot<T, F> where F: Fn(&T, &T) -> Ordering {}

pub(crate) struct CmpQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    heap: BinaryHeap<Slot<T, F>>,
    compare: Arc<F>,
    next_seq: u64,
}

impl<T, F> CmpQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub(crate) fn new(items: Vec<T>, compare: F) -> Self {
        let mut queue = Self {
            heap: BinaryHeap::with_capacity(items.len()),
            compare: Arc::new(compare),
            next_seq: 0,
        };
        for item in items {
            queue.push(item);
        }
        queue
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn push(&mut self, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Slot {
            item,
            seq,
            compare: Arc::clone(&self.compare),
        });
    }

    /// Remove and return the smallest element.
    pub(crate) fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|slot| slot.item)
    }
}
