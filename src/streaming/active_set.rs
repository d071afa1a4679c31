//! Active set management for streaming operations.
//!
//! The ActiveSet holds the records that overlap the current position. Records
//! enter in stream order and leave whenever they end, which is not
//! necessarily first-in first-out, so removal is a stable in-place retain.

/// Active set preserving insertion order.
///
/// # Memory Complexity
///
/// O(k) where k = max number of records overlapping any one position.
#[derive(Debug)]
pub struct ActiveSet<T> {
    /// Storage for active elements, oldest first.
    data: Vec<T>,
    /// Maximum observed active size (for statistics).
    max_active: usize,
}

impl<T> Default for ActiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ActiveSet<T> {
    /// Create a new empty active set.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new active set with specified initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            max_active: 0,
        }
    }

    /// Add an element to the active set.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.data.push(value);
        if self.data.len() > self.max_active {
            self.max_active = self.data.len();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Keep only the elements for which `keep` returns true, preserving
    /// order. Returns the number of elements removed.
    #[inline]
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.data.len();
        self.data.retain(keep);
        before - self.data.len()
    }

    /// Clear all elements; statistics are kept.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Get the maximum active size observed (for statistics).
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.data.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_set_basic() {
        let mut set: ActiveSet<u32> = ActiveSet::new();
        set.push(1);
        set.push(2);
        set.push(3);

        assert_eq!(set.len(), 3);
        assert_eq!(set.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_retain_keeps_order() {
        let mut set: ActiveSet<u32> = ActiveSet::new();
        for i in 0..10 {
            set.push(i);
        }
        let removed = set.retain(|&x| x % 3 != 0);
        assert_eq!(removed, 4);
        assert_eq!(set.as_slice(), &[1, 2, 4, 5, 7, 8]);
    }

    #[test]
    fn test_max_active_survives_clear() {
        let mut set: ActiveSet<u32> = ActiveSet::new();
        set.push(1);
        set.push(2);
        set.retain(|_| false);
        set.push(3);
        assert_eq!(set.max_active(), 2);

        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.max_active(), 2);
    }
}
