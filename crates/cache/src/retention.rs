//! Strong-retention ring
//!
//! The cache map only holds weak handles, so a resource lives exactly as
//! long as somebody holds an `Arc` to it. The ring is that somebody for
//! the N most recently touched resources: it keeps hot pages alive between
//! repaints even when no caller is holding them.

use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded FIFO of strong references, most recently touched at the back
///
/// The ring carries no identity information. Touching a resource that is
/// already in the ring moves it to the back instead of adding a duplicate.
#[derive(Debug)]
pub struct RetentionRing<R> {
    slots: VecDeque<Arc<R>>,
    capacity: usize,
}

impl<R> RetentionRing<R> {
    /// Create a ring that keeps at most `capacity` resources alive
    ///
    /// A capacity of zero retains nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::new(),
            capacity,
        }
    }

    /// Mark a resource as most recently used
    ///
    /// Drops the oldest entry once the ring is full.
    pub fn touch(&mut self, resource: &Arc<R>) {
        if self.capacity == 0 {
            return;
        }

        if let Some(pos) = self.slots.iter().position(|r| Arc::ptr_eq(r, resource)) {
            if pos + 1 == self.slots.len() {
                return;
            }
            self.slots.remove(pos);
        }

        while self.slots.len() >= self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(Arc::clone(resource));
    }

    /// Returns `true` if this exact allocation is being retained
    pub fn contains(&self, resource: &Arc<R>) -> bool {
        self.slots.iter().any(|r| Arc::ptr_eq(r, resource))
    }

    /// Release every retained resource
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut ring = RetentionRing::new(3);
        let items: Vec<_> = (0..5).map(Arc::new).collect();

        for item in &items {
            ring.touch(item);
        }

        assert_eq!(ring.len(), 3);
        assert!(!ring.contains(&items[0]));
        assert!(!ring.contains(&items[1]));
        assert!(ring.contains(&items[4]));
    }

    #[test]
    fn test_evicted_resource_is_released() {
        let mut ring = RetentionRing::new(1);
        let first = Arc::new(String::from("first"));
        let weak = Arc::downgrade(&first);

        ring.touch(&first);
        drop(first);
        assert!(weak.upgrade().is_some());

        ring.touch(&Arc::new(String::from("second")));
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_touch_moves_to_back() {
        let mut ring = RetentionRing::new(2);
        let a = Arc::new(1);
        let b = Arc::new(2);
        let c = Arc::new(3);

        ring.touch(&a);
        ring.touch(&b);
        ring.touch(&a); // a is now the most recent
        ring.touch(&c); // evicts b

        assert_eq!(ring.len(), 2);
        assert!(ring.contains(&a));
        assert!(!ring.contains(&b));
        assert!(ring.contains(&c));
    }

    #[test]
    fn test_equal_values_are_distinct_slots() {
        let mut ring = RetentionRing::new(4);
        let a = Arc::new(7);
        let b = Arc::new(7);

        ring.touch(&a);
        ring.touch(&b);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_zero_capacity() {
        let mut ring = RetentionRing::new(0);
        ring.touch(&Arc::new(1));
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 0);
    }

    #[test]
    fn test_unbounded_capacity() {
        let mut ring = RetentionRing::new(usize::MAX);
        let values: Vec<_> = (0..3).map(Arc::new).collect();
        for value in &values {
            ring.touch(value);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.capacity(), usize::MAX);
    }

    #[test]
    fn test_clear() {
        let mut ring = RetentionRing::new(2);
        ring.touch(&Arc::new(1));
        ring.clear();
        assert!(ring.is_empty());
    }
}
