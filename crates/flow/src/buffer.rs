//! Bounded collections: [`RingBuffer`] (append newest, evict oldest) and
//! [`CappedArray`] (insert at front, evict from back).

use std::collections::VecDeque;

/// Fixed-capacity history buffer.
///
/// Iteration order is oldest to newest. Pushing into a full buffer drops the
/// oldest entry, so `len()` never exceeds `capacity()`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.buf.iter()
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.buf.iter().skip(self.buf.len().saturating_sub(n))
    }

    pub fn last(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Newest-first list with a hard size limit.
///
/// New items go to the front; once the list is over `max_size` the oldest
/// items fall off the back. Used for activity feeds where only the latest
/// entries matter.
#[derive(Debug, Clone)]
pub struct CappedArray<T> {
    items: VecDeque<T>,
    max_size: usize,
}

impl<T> CappedArray<T> {
    /// # Panics
    ///
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "CappedArray max_size must be > 0");
        Self {
            items: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn add(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(self.max_size);
    }

    /// Prepends a batch, keeping the batch's own order at the front.
    pub fn add_many<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: DoubleEndedIterator,
    {
        for item in batch.into_iter().rev() {
            self.items.push_front(item);
        }
        self.items.truncate(self.max_size);
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> CappedArray<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_never_exceeds_capacity() {
        let mut rb = RingBuffer::new(10);
        for i in 0..25 {
            rb.push(i);
            assert!(rb.len() <= 10);
        }
        assert_eq!(rb.len(), 10);
        assert_eq!(rb.iter().copied().collect::<Vec<_>>(), (15..25).collect::<Vec<_>>());
        assert_eq!(rb.last(), Some(&24));
    }

    #[test]
    fn ring_recent_returns_tail_in_order() {
        let mut rb = RingBuffer::new(10);
        for i in 1..=7 {
            rb.push(i);
        }
        assert_eq!(rb.recent(3).copied().collect::<Vec<_>>(), vec![5, 6, 7]);
        assert_eq!(rb.recent(50).count(), 7);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn ring_zero_capacity_panics() {
        let _rb: RingBuffer<u8> = RingBuffer::new(0);
    }

    #[test]
    fn capped_inserts_at_front_and_evicts_back() {
        let mut arr = CappedArray::new(3);
        arr.add("a");
        arr.add("b");
        arr.add("c");
        arr.add("d");
        assert_eq!(arr.to_vec(), vec!["d", "c", "b"]);
        assert_eq!(arr.newest(), Some(&"d"));
    }

    #[test]
    fn capped_add_many_keeps_batch_order() {
        let mut arr = CappedArray::new(4);
        arr.add(1);
        arr.add(2);
        arr.add_many(vec![10, 11, 12]);
        assert_eq!(arr.to_vec(), vec![10, 11, 12, 2]);
        assert_eq!(arr.len(), 4);
    }

    #[test]
    fn capped_clear() {
        let mut arr = CappedArray::new(2);
        arr.add(1);
        arr.clear();
        assert!(arr.is_empty());
        assert_eq!(arr.max_size(), 2);
    }
}
