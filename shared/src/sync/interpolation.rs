use std::collections::VecDeque;

/// Small FIFO of received snapshots for display interpolation.
///
/// Rendering blends between the two oldest entries, trading a fixed delay for
/// smooth motion under jitter. Pushing past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer<T> {
    snapshots: VecDeque<T>,
    capacity: usize,
}

impl<T> SnapshotBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: T) {
        if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// The interpolation pair `(from, to)`, once two snapshots are buffered.
    pub fn get(&self) -> Option<(&T, &T)> {
        match (self.snapshots.front(), self.snapshots.get(1)) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    /// Drops the oldest snapshot once display has moved past it.
    pub fn advance(&mut self) -> Option<T> {
        self.snapshots.pop_front()
    }

    pub fn latest(&self) -> Option<&T> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_needs_two_snapshots() {
        let mut buffer = SnapshotBuffer::new(4);
        assert!(buffer.get().is_none());
        buffer.push(1);
        assert!(buffer.get().is_none());
        assert_eq!(buffer.latest(), Some(&1));
        buffer.push(2);
        assert_eq!(buffer.get(), Some((&1, &2)));
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = SnapshotBuffer::new(3);
        for i in 0..5 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get(), Some((&2, &3)));
        assert_eq!(buffer.latest(), Some(&4));
    }

    #[test]
    fn test_advance_pops_oldest() {
        let mut buffer = SnapshotBuffer::new(3);
        buffer.push('a');
        buffer.push('b');
        buffer.push('c');
        assert_eq!(buffer.advance(), Some('a'));
        assert_eq!(buffer.get(), Some((&'b', &'c')));
        buffer.advance();
        buffer.advance();
        assert!(buffer.is_empty());
        assert_eq!(buffer.advance(), None);
    }

    #[test]
    fn test_capacity_floor() {
        assert_eq!(SnapshotBuffer::<u8>::new(0).capacity(), 2);
    }
}
