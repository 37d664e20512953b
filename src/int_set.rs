use core::fmt::Debug;

use crate::allocator::CellAllocator;
use crate::allocator::Global;
use crate::hash_table::HashTable;
use crate::iter::Keys;

/// A set of `u64` keys backed by a [`HashTable<()>`](HashTable).
///
/// Every key, including `0`, can be stored.
///
/// # Performance Characteristics
///
/// - **Memory**: one `u64` per cell, with at least a quarter of the cells
///   unused.
#[derive(Clone)]
pub struct IntSet<A: CellAllocator = Global> {
    table: HashTable<(), A>,
}

impl<A: CellAllocator> PartialEq for IntSet<A> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|key| other.contains(key))
    }
}

impl<A: CellAllocator> Eq for IntSet<A> {}

impl<A: CellAllocator> Debug for IntSet<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl IntSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty set whose table has `capacity` cells, rounded up to a
    /// power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl Default for IntSet {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: CellAllocator> IntSet<A> {
    /// Creates an empty set with `capacity` cells allocated from `alloc`.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        IntSet {
            table: HashTable::with_capacity_in(capacity, alloc),
        }
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no keys.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of cells in the underlying table.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all keys, keeping the capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Shrinks the underlying table to the smallest capacity that holds the
    /// current keys.
    pub fn compact(&mut self) {
        self.table.compact();
    }

    /// Adds `key` to the set.
    ///
    /// Returns `true` if the key was not already present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::IntSet;
    /// #
    /// let mut set = IntSet::new();
    /// assert!(set.insert(0));
    /// assert!(set.insert(12));
    /// assert!(!set.insert(12));
    /// assert_eq!(set.len(), 2);
    /// ```
    pub fn insert(&mut self, key: u64) -> bool {
        self.table.insert(key).1
    }

    /// Returns `true` if the set contains `key`.
    pub fn contains(&self, key: u64) -> bool {
        self.table.contains_key(key)
    }

    /// Removes `key` from the set.
    ///
    /// Returns `true` if the key was present.
    pub fn remove(&mut self, key: u64) -> bool {
        self.table.delete_key(key).is_some()
    }

    /// Returns an iterator over the keys, in unspecified order.
    pub fn iter(&self) -> Keys<'_, ()> {
        self.table.keys()
    }

    /// Returns `true` if every key of `self` is also in `other`.
    pub fn is_subset<B: CellAllocator>(&self, other: &IntSet<B>) -> bool {
        self.len() <= other.len() && self.iter().all(|key| other.contains(key))
    }

    /// Returns `true` if `self` and `other` have no keys in common.
    pub fn is_disjoint<B: CellAllocator>(&self, other: &IntSet<B>) -> bool {
        if self.len() <= other.len() {
            self.iter().all(|key| !other.contains(key))
        } else {
            other.iter().all(|key| !self.contains(key))
        }
    }
}

impl<'a, A: CellAllocator> IntoIterator for &'a IntSet<A> {
    type IntoIter = Keys<'a, ()>;
    type Item = u64;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<u64> for IntSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut set = IntSet::new();
        set.extend(iter);
        set
    }
}

impl<A: CellAllocator> Extend<u64> for IntSet<A> {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}
