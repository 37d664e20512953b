//! An open-addressing table from `u64` keys to values of type `V`.
//!
//! Entries live directly in one power-of-two array of cells and collisions
//! are resolved by linear probing. Key `0` marks an unused cell, so the
//! logical entry for key `0` is stored out of band. Deletion shifts the rest
//! of the probe chain backwards instead of leaving tombstones, and the array
//! doubles before the load factor reaches 75%.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::mem::MaybeUninit;
use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering;

use crate::allocator::CellAllocator;
use crate::allocator::Global;
#[cfg(any(test, feature = "stats"))]
use crate::cells::Cell;
use crate::cells::RawCells;
use crate::cells::VACANT;
use crate::cells::VacateOnDrop;
use crate::error::Fault;
use crate::iter::Drain;
use crate::iter::Handles;
use crate::iter::Iter;
use crate::iter::IterMut;
use crate::iter::Keys;
use crate::iter::Values;
use crate::mix::circular_distance;
use crate::mix::ideal_slot;
use crate::sizing::compact_capacity;
use crate::sizing::exceeds_load;
use crate::sizing::upper_power_of_two;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    Zero,
    Index(usize),
}

/// Identifies one live entry of a [`HashTable`].
///
/// Handles are returned by [`HashTable::lookup`], [`HashTable::insert`] and
/// the entry API, and are consumed by [`HashTable::delete`] and
/// [`HashTable::resolve`]. A handle stops being valid when:
///
/// - an insert grows the table, or [`repopulate`], [`compact`], [`clear`] or
///   [`drain`] rebuilds or wipes it (detected through a generation counter);
/// - its entry is deleted, or moved by the backward shift of another
///   deletion (detected because the slot no longer holds the handle's key).
///
/// Stale handles are rejected with a [`Fault`] rather than aliasing another
/// entry. Re-[`lookup`] after mutating the table.
///
/// A handle belongs to the table that issued it. Every table starts from its
/// own generation, so another table rejects the handle as stale. Clones
/// inherit the generation and accept the handles of their source until
/// either of them is rebuilt.
///
/// [`repopulate`]: HashTable::repopulate
/// [`compact`]: HashTable::compact
/// [`clear`]: HashTable::clear
/// [`drain`]: HashTable::drain
/// [`lookup`]: HashTable::lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    generation: u64,
    slot: Slot,
    key: u64,
}

/// Source of distinct starting generations, one per table.
static LINEAGES: AtomicUsize = AtomicUsize::new(0);

#[inline]
fn first_generation() -> u64 {
    (LINEAGES.fetch_add(1, Ordering::Relaxed) as u64) << 32
}

impl Handle {
    #[inline(always)]
    pub(crate) fn new(generation: u64, slot: Slot, key: u64) -> Self {
        Handle {
            generation,
            slot,
            key,
        }
    }

    /// The key of the entry this handle refers to.
    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }
}

/// Debug statistics for hash table analysis.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of entries, including the key-0 entry
    pub populated: usize,
    /// Number of cells in the main array
    pub capacity: usize,
    /// Number of cells currently occupied
    pub occupied_slots: usize,
    /// Whether the out-of-band key-0 entry is present
    pub zero_used: bool,
    /// Load factor (populated / capacity)
    pub load_factor: f64,
    /// Longest distance of an entry from its ideal slot
    pub max_probe_length: usize,
    /// Mean distance of an entry from its ideal slot
    pub mean_probe_length: f64,
    /// Total bytes allocated for the main array
    pub total_bytes: usize,
    /// Bytes held by unoccupied cells
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor, zero entry: {})",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.zero_used
        );
        println!(
            "Slot Usage: {}/{} occupied",
            self.occupied_slots, self.capacity
        );
        println!(
            "Probe Length: max {}, mean {:.3}",
            self.max_probe_length, self.mean_probe_length
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// Histogram of distances between entries and their ideal slots.
///
/// Bin `d` counts the entries of the main array stored `d` cells past the
/// slot their key hashes to. The key-0 entry is not counted.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    bins: Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// The counts, indexed by probe length.
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Total number of entries counted.
    pub fn total(&self) -> usize {
        self.bins.iter().sum()
    }

    /// Pretty-prints the histogram horizontally using stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = *self.bins.iter().max().unwrap_or(&0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.total());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let full = units / 8;
            let rem = units % 8;
            let mut bar = "█".repeat(full);
            if rem > 0 {
                let ch = match rem {
                    1 => '▏',
                    2 => '▎',
                    3 => '▍',
                    4 => '▌',
                    5 => '▋',
                    6 => '▊',
                    7 => '▉',
                    _ => unreachable!(),
                };
                bar.push(ch);
            }
            bar
        };

        for (i, &count) in self.bins.iter().enumerate() {
            println!("{:>3} | {} ({})", i, make_bar(count), count);
        }
    }
}

/// An integer-keyed hash table using linear probing.
///
/// `HashTable<V>` maps `u64` keys to values of type `V`. Every key, including
/// `0`, is storable: key `0` doubles as the unused-cell marker inside the
/// main array, so its entry is kept in a dedicated out-of-band cell.
///
/// The table is single-owner: it holds no locks, and shared use across
/// threads needs external synchronization around each logical operation.
/// Iterators borrow the table, so it cannot be mutated while one is alive.
///
/// ## Performance Characteristics
///
/// - Lookup, insert and delete are O(1) amortized.
/// - Growth, [`repopulate`], [`compact`] and [`clear`] are O(capacity).
/// - **Memory**: one `u64` key plus the size of `V` per cell, with at least a
///   quarter of the cells unused.
///
/// [`repopulate`]: HashTable::repopulate
/// [`compact`]: HashTable::compact
/// [`clear`]: HashTable::clear
///
/// ## Example
///
/// ```rust
/// use probe_table::HashTable;
///
/// let mut table: HashTable<&str> = HashTable::with_capacity(4);
///
/// let (handle, created) = table.insert(7);
/// assert!(created);
/// *table.resolve_mut(handle).unwrap() = "seven";
///
/// table.set(0, "zero");
/// assert_eq!(table.get(7), Some(&"seven"));
/// assert_eq!(table.get(0), Some(&"zero"));
///
/// assert_eq!(table.delete_key(7), Some("seven"));
/// assert!(table.lookup(7).is_none());
/// ```
pub struct HashTable<V, A: CellAllocator = Global> {
    cells: RawCells<V>,
    population: usize,
    zero: Option<V>,
    generation: u64,
    alloc: A,
}

// SAFETY: The table exclusively owns its cell block; values are only reached
// through `&self` or `&mut self`, exactly as if they were held in a `Vec<V>`.
unsafe impl<V: Send, A: CellAllocator + Send> Send for HashTable<V, A> {}
// SAFETY: See above; shared access only hands out `&V`.
unsafe impl<V: Sync, A: CellAllocator + Sync> Sync for HashTable<V, A> {}

impl<V, A: CellAllocator> Debug for HashTable<V, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::ToString;

        f.debug_struct("HashTable")
            .field(
                "cells",
                &self
                    .cells
                    .as_slice()
                    .chunks(8)
                    .map(|row| {
                        row.iter()
                            .map(|cell| {
                                if cell.is_live() {
                                    format!("{:016x}", cell.key)
                                } else {
                                    "................".to_string()
                                }
                            })
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .collect::<Vec<_>>(),
            )
            .field("zero_used", &self.zero.is_some())
            .field("populated", &self.population)
            .field("capacity", &self.capacity())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<V, A> Clone for HashTable<V, A>
where
    V: Clone,
    A: CellAllocator + Clone,
{
    fn clone(&self) -> Self {
        let mut new_table = Self::with_capacity_in(self.capacity(), self.alloc.clone());
        new_table.zero = self.zero.clone();

        // Same capacity, so every entry keeps its slot and probe chains are
        // preserved as-is.
        let dst_cells = new_table.cells.as_mut_slice();
        for (src, dst) in self.cells.as_slice().iter().zip(dst_cells.iter_mut()) {
            if src.is_live() {
                // SAFETY: The source cell is live, so its value is initialized.
                let value = unsafe { src.value.assume_init_ref() }.clone();
                dst.value.write(value);
                dst.key = src.key;
            }
        }

        new_table.population = self.population;
        new_table.generation = self.generation;
        new_table
    }
}

impl<V, A: CellAllocator> Drop for HashTable<V, A> {
    fn drop(&mut self) {
        if core::mem::needs_drop::<V>() {
            for cell in self.cells.as_mut_slice() {
                if cell.is_live() {
                    // SAFETY: The cell is live, so its value is initialized, and
                    // it is never touched again.
                    unsafe { cell.value.assume_init_drop() };
                }
            }
        }

        // SAFETY: The block came from `self.alloc` and is dropped with the
        // table.
        unsafe { self.cells.deallocate(&self.alloc) };
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with a single cell.
    ///
    /// The table grows on the first insert of a non-zero key.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty table whose main array has `capacity` cells, rounded
    /// up to a power of two.
    ///
    /// Note that `capacity` counts cells, not entries: the table grows once
    /// three quarters of them would be in use.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let table: HashTable<u32> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 128);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<V, A: CellAllocator> HashTable<V, A> {
    /// Creates an empty table with `capacity` cells (rounded up to a power of
    /// two) allocated from `alloc`.
    ///
    /// Every later backing store, after growth or compaction, comes from the
    /// same allocator.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        let capacity = upper_power_of_two(capacity);
        HashTable {
            cells: RawCells::allocate(&alloc, capacity),
            population: 0,
            zero: None,
            generation: first_generation(),
            alloc,
        }
    }

    /// Returns the number of entries in the table, including the key-0
    /// entry.
    #[inline]
    pub fn len(&self) -> usize {
        self.population
    }

    /// Returns `true` if the table contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.population == 0
    }

    /// Returns the number of cells in the main array. Always a power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Returns a reference to the table's allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.cells.len() - 1
    }

    #[inline(always)]
    fn handle(&self, slot: Slot, key: u64) -> Handle {
        Handle::new(self.generation, slot, key)
    }

    /// Walks the probe chain of a non-zero `key`.
    ///
    /// Returns `Ok(index)` of the cell holding `key`, or `Err(index)` of the
    /// first unused cell, which ends the chain. At least one cell is always
    /// unused, so the walk terminates.
    #[inline]
    fn probe(&self, key: u64) -> Result<usize, usize> {
        debug_assert!(key != VACANT);
        let mask = self.mask();
        let cells = self.cells.as_slice();

        let mut index = ideal_slot(key, mask);
        loop {
            let cell = &cells[index];
            if cell.key == key {
                return Ok(index);
            }
            if !cell.is_live() {
                return Err(index);
            }
            index = (index + 1) & mask;
        }
    }

    #[inline]
    fn find(&self, key: u64) -> Option<Slot> {
        if key == 0 {
            return self.zero.as_ref().map(|_| Slot::Zero);
        }
        self.probe(key).ok().map(Slot::Index)
    }

    #[inline]
    fn slot_ref(&self, slot: Slot) -> Option<&V> {
        match slot {
            Slot::Zero => self.zero.as_ref(),
            Slot::Index(index) => {
                let cell = &self.cells.as_slice()[index];
                // SAFETY: The value of a live cell is initialized.
                cell.is_live()
                    .then(|| unsafe { cell.value.assume_init_ref() })
            }
        }
    }

    #[inline]
    fn slot_mut(&mut self, slot: Slot) -> Option<&mut V> {
        match slot {
            Slot::Zero => self.zero.as_mut(),
            Slot::Index(index) => {
                let cell = &mut self.cells.as_mut_slice()[index];
                if cell.is_live() {
                    // SAFETY: The value of a live cell is initialized.
                    Some(unsafe { cell.value.assume_init_mut() })
                } else {
                    None
                }
            }
        }
    }

    /// Looks up `key`, returning a handle to its entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(8);
    /// let (handle, _) = table.insert_with(5, || "five");
    ///
    /// assert_eq!(table.lookup(5), Some(handle));
    /// assert_eq!(table.lookup(6), None);
    /// assert_eq!(table.lookup(0), None);
    /// ```
    pub fn lookup(&self, key: u64) -> Option<Handle> {
        let slot = self.find(key)?;
        Some(self.handle(slot, key))
    }

    /// Returns `true` if the table contains `key`.
    pub fn contains_key(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    /// Returns a reference to the value stored for `key`.
    pub fn get(&self, key: u64) -> Option<&V> {
        self.slot_ref(self.find(key)?)
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let slot = self.find(key)?;
        self.slot_mut(slot)
    }

    /// Checks that `handle` still names a live entry of the current store.
    fn check(&self, handle: Handle) -> Result<Slot, Fault> {
        if handle.generation != self.generation {
            return Err(Fault::StaleHandle {
                handle: handle.generation,
                table: self.generation,
            });
        }

        match handle.slot {
            Slot::Zero if self.zero.is_some() => Ok(Slot::Zero),
            Slot::Zero => Err(Fault::ZeroKeyAbsent),
            Slot::Index(index) => {
                let cell = self
                    .cells
                    .as_slice()
                    .get(index)
                    .ok_or(Fault::OutOfBounds {
                        index,
                        capacity: self.capacity(),
                    })?;
                // Index handles never carry key 0, so a match implies a live
                // cell.
                if cell.key != handle.key {
                    return Err(Fault::NotLive {
                        index,
                        key: handle.key,
                    });
                }
                Ok(Slot::Index(index))
            }
        }
    }

    /// Returns the value `handle` refers to, or `None` if the handle is no
    /// longer valid.
    pub fn resolve(&self, handle: Handle) -> Option<&V> {
        let slot = self.check(handle).ok()?;
        self.slot_ref(slot)
    }

    /// Returns the value `handle` refers to mutably, or `None` if the handle
    /// is no longer valid.
    pub fn resolve_mut(&mut self, handle: Handle) -> Option<&mut V> {
        let slot = self.check(handle).ok()?;
        self.slot_mut(slot)
    }

    /// Gets the entry for `key` for in-place insertion or modification.
    ///
    /// If `key` is absent and inserting it would bring the table to 75% load,
    /// the table is doubled first, so the returned [`VacantEntry`] is always
    /// insertable and handles issued earlier become stale.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// # use probe_table::hash_table::Entry;
    /// #
    /// let mut table = HashTable::with_capacity(8);
    ///
    /// match table.entry(3) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert(10u32);
    ///     }
    ///     Entry::Occupied(_) => unreachable!(),
    /// }
    ///
    /// *table.entry(3).or_insert(0) += 1;
    /// assert_eq!(table.get(3), Some(&11));
    /// ```
    pub fn entry(&mut self, key: u64) -> Entry<'_, V, A> {
        if key == 0 {
            if self.zero.is_some() {
                return Entry::Occupied(OccupiedEntry {
                    table: self,
                    slot: Slot::Zero,
                    key,
                });
            }
            if exceeds_load(self.population + 1, self.capacity()) {
                self.grow();
            }
            return Entry::Vacant(VacantEntry {
                table: self,
                slot: Slot::Zero,
                key,
            });
        }

        loop {
            match self.probe(key) {
                Ok(index) => {
                    return Entry::Occupied(OccupiedEntry {
                        table: self,
                        slot: Slot::Index(index),
                        key,
                    });
                }
                Err(_) if exceeds_load(self.population + 1, self.capacity()) => {
                    // The vacant index belongs to the old store; probe again.
                    self.grow();
                }
                Err(index) => {
                    return Entry::Vacant(VacantEntry {
                        table: self,
                        slot: Slot::Index(index),
                        key,
                    });
                }
            }
        }
    }

    /// Inserts `key` if absent, returning its handle and whether it was
    /// created.
    ///
    /// A created entry holds `V::default()`; write the real value through
    /// [`resolve_mut`](Self::resolve_mut). An existing entry is left
    /// untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(4);
    ///
    /// let (first, created) = table.insert(5);
    /// assert!(created);
    /// let (second, created) = table.insert(5);
    /// assert!(!created);
    /// assert_eq!(first, second);
    /// ```
    pub fn insert(&mut self, key: u64) -> (Handle, bool)
    where
        V: Default,
    {
        self.insert_with(key, V::default)
    }

    /// Inserts `key` with the value produced by `value` if absent, returning
    /// its handle and whether it was created.
    ///
    /// `value` is only called when the entry is created.
    pub fn insert_with(&mut self, key: u64, value: impl FnOnce() -> V) -> (Handle, bool) {
        match self.entry(key) {
            Entry::Occupied(entry) => (entry.handle(), false),
            Entry::Vacant(entry) => {
                let handle = entry.handle();
                entry.insert(value());
                (handle, true)
            }
        }
    }

    /// Stores `value` under `key`, returning the previous value if any.
    pub fn set(&mut self, key: u64, value: V) -> Option<V> {
        match self.entry(key) {
            Entry::Occupied(mut entry) => Some(entry.insert(value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Deletes the entry `handle` refers to and returns its key and value.
    ///
    /// # Errors
    ///
    /// Returns a [`Fault`] if the handle is stale: issued before the store was
    /// rebuilt, naming an absent key-0 entry, or naming a slot that no longer
    /// holds its key. The table is left untouched.
    pub fn try_delete(&mut self, handle: Handle) -> Result<(u64, V), Fault> {
        let value = match self.check(handle)? {
            Slot::Zero => self.take_zero().ok_or(Fault::ZeroKeyAbsent)?,
            Slot::Index(index) => self.erase_index(index),
        };
        Ok((handle.key, value))
    }

    /// Deletes the entry `handle` refers to and returns its value.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale; see [`try_delete`](Self::try_delete).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(8);
    /// table.set(9, "nine");
    ///
    /// let handle = table.lookup(9).unwrap();
    /// assert_eq!(table.delete(handle), "nine");
    /// assert!(table.try_delete(handle).is_err());
    /// ```
    pub fn delete(&mut self, handle: Handle) -> V {
        match self.try_delete(handle) {
            Ok((_, value)) => value,
            Err(fault) => panic!("{fault}"),
        }
    }

    /// Deletes `key`, returning its value if it was present.
    pub fn delete_key(&mut self, key: u64) -> Option<V> {
        match self.find(key)? {
            Slot::Zero => self.take_zero(),
            Slot::Index(index) => Some(self.erase_index(index)),
        }
    }

    fn take_zero(&mut self) -> Option<V> {
        let value = self.zero.take()?;
        self.population -= 1;
        Some(value)
    }

    /// Removes the live cell at `pos` and closes the gap it leaves.
    ///
    /// Each following cell up to the end of the chain moves back into the
    /// gap if the gap lies between its ideal slot and its current slot, so no
    /// entry's probe chain ever contains an unused cell.
    fn erase_index(&mut self, mut pos: usize) -> V {
        let mask = self.mask();
        let cells = self.cells.as_mut_slice();

        // SAFETY: Callers only pass indices of live cells.
        let value = unsafe { cells[pos].take() };

        let mut nei = (pos + 1) & mask;
        while cells[nei].is_live() {
            let ideal = ideal_slot(cells[nei].key, mask);
            if circular_distance(ideal, pos, mask) < circular_distance(ideal, nei, mask) {
                cells.swap(pos, nei);
                pos = nei;
            }
            nei = (nei + 1) & mask;
        }

        debug_assert!(!cells[pos].is_live());
        self.population -= 1;
        value
    }

    /// Removes and drops every entry, keeping the capacity.
    ///
    /// All outstanding handles become stale.
    pub fn clear(&mut self) {
        self.population = 0;
        self.bump_generation();
        let zero = self.zero.take();

        // Every cell is vacated even if a destructor panics; the values not
        // yet dropped leak.
        let mut cells = VacateOnDrop::new(self.cells.as_mut_slice());
        for cell in cells.iter_mut() {
            if cell.is_live() {
                // SAFETY: The cell is live and the guard marks it vacant
                // before it can be observed again.
                drop(unsafe { cell.value.assume_init_read() });
            }
        }
        drop(cells);
        drop(zero);
    }

    /// Rebuilds the table at the smallest capacity that keeps the current
    /// entries below 75% load.
    ///
    /// The store is rebuilt even when the capacity does not change, so all
    /// outstanding handles become stale.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(64);
    /// for key in 1..=3 {
    ///     table.set(key, key * 10);
    /// }
    ///
    /// table.compact();
    /// assert_eq!(table.capacity(), 8);
    /// assert_eq!(table.get(2), Some(&20));
    /// ```
    pub fn compact(&mut self) {
        self.rehash(compact_capacity(self.population));
    }

    /// Rebuilds the table with exactly `capacity` cells.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::NotPowerOfTwo`] or [`Fault::Overloaded`] (when
    /// `len() * 4 > capacity * 3`) and leaves the table untouched.
    pub fn try_repopulate(&mut self, capacity: usize) -> Result<(), Fault> {
        if !capacity.is_power_of_two() {
            return Err(Fault::NotPowerOfTwo(capacity));
        }
        if self.population.saturating_mul(4) > capacity.saturating_mul(3) {
            return Err(Fault::Overloaded {
                population: self.population,
                capacity,
            });
        }

        self.rehash(capacity);
        Ok(())
    }

    /// Rebuilds the table with exactly `capacity` cells.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two or cannot hold the current
    /// entries; see [`try_repopulate`](Self::try_repopulate).
    pub fn repopulate(&mut self, capacity: usize) {
        if let Err(fault) = self.try_repopulate(capacity) {
            panic!("{fault}");
        }
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self) {
        let capacity = self
            .capacity()
            .checked_mul(2)
            .expect("capacity overflow");
        self.rehash(capacity);
    }

    /// Moves every entry of the main array into a fresh store of `capacity`
    /// cells. The key-0 entry stays where it is.
    fn rehash(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(self.population * 4 <= capacity * 3);

        let mut old_cells =
            core::mem::replace(&mut self.cells, RawCells::allocate(&self.alloc, capacity));

        let mask = capacity - 1;
        let new_cells = self.cells.as_mut_slice();
        for cell in old_cells.as_mut_slice() {
            if !cell.is_live() {
                continue;
            }

            // Keys in the old store are unique, so no match check is needed.
            let mut index = ideal_slot(cell.key, mask);
            while new_cells[index].is_live() {
                index = (index + 1) & mask;
            }

            let target = &mut new_cells[index];
            target.value = core::mem::replace(&mut cell.value, MaybeUninit::uninit());
            target.key = core::mem::replace(&mut cell.key, VACANT);
        }

        // SAFETY: The old block came from `self.alloc` and every value has been
        // moved out of it.
        unsafe { old_cells.deallocate(&self.alloc) };
        self.bump_generation();
    }

    #[inline]
    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Swaps in an empty store of the same capacity and returns the old one,
    /// together with the key-0 entry and the population they hold.
    ///
    /// The table is empty and consistent afterwards; the caller owns every
    /// value left in the returned store.
    pub(crate) fn detach_store(&mut self) -> (RawCells<V>, Option<V>, usize) {
        let fresh = RawCells::allocate(&self.alloc, self.capacity());
        let cells = core::mem::replace(&mut self.cells, fresh);
        let population = core::mem::take(&mut self.population);
        self.bump_generation();
        (cells, self.zero.take(), population)
    }

    /// Returns a store obtained from [`detach_store`](Self::detach_store) to
    /// the allocator.
    ///
    /// # Safety
    ///
    /// `cells` must come from `detach_store` on this table, hold no live
    /// values, and not be used afterwards.
    pub(crate) unsafe fn release_store(&self, cells: &mut RawCells<V>) {
        // SAFETY: Upheld by the caller; detached stores come from `self.alloc`.
        unsafe { cells.deallocate(&self.alloc) }
    }

    /// Returns an iterator over the handles of all entries.
    ///
    /// The key-0 entry comes first, followed by the main array in slot order.
    pub fn handles(&self) -> Handles<'_, V> {
        Handles::new(
            self.zero.is_some(),
            self.cells.as_slice(),
            self.generation,
            self.population,
        )
    }

    /// Returns an iterator over all `(key, &value)` pairs.
    ///
    /// The key-0 entry comes first, followed by the main array in slot order.
    /// This order is neither insertion order nor sorted, and changes when the
    /// table is rebuilt.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(8);
    /// table.set(4, 'd');
    /// table.set(0, 'z');
    ///
    /// let mut pairs: Vec<_> = table.iter().collect();
    /// assert_eq!(pairs[0], (0, &'z'));
    /// pairs.sort();
    /// assert_eq!(pairs, [(0, &'z'), (4, &'d')]);
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self.handles(), self.zero.as_ref())
    }

    /// Returns an iterator over all `(key, &mut value)` pairs, in the same
    /// order as [`iter`](Self::iter).
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        let len = self.population;
        IterMut::new(self.zero.as_mut(), self.cells.as_mut_slice(), len)
    }

    /// Returns an iterator over all keys.
    pub fn keys(&self) -> Keys<'_, V> {
        Keys::new(self.iter())
    }

    /// Returns an iterator over all values.
    pub fn values(&self) -> Values<'_, V> {
        Values::new(self.iter())
    }

    /// Removes and yields every `(key, value)` pair, keeping the capacity.
    ///
    /// The table is empty as soon as this is called, and all outstanding
    /// handles become stale. Entries not yet yielded are dropped with the
    /// iterator, or leaked if the iterator is leaked.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(8);
    /// table.set(1, "a");
    /// table.set(2, "b");
    ///
    /// let mut drained: Vec<_> = table.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, [(1, "a"), (2, "b")]);
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 8);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, V, A> {
        Drain::new(self)
    }

    /// Computes a histogram of probe lengths for the current table state.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let mask = self.mask();
        let mut bins = Vec::new();
        for (index, cell) in self.cells.as_slice().iter().enumerate() {
            if !cell.is_live() {
                continue;
            }
            let distance = circular_distance(ideal_slot(cell.key, mask), index, mask);
            if bins.len() <= distance {
                bins.resize(distance + 1, 0);
            }
            bins[distance] += 1;
        }
        ProbeHistogram { bins }
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Available in tests and with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let histogram = self.probe_histogram();
        let occupied_slots = histogram.total();
        let total_probe: usize = histogram
            .bins()
            .iter()
            .enumerate()
            .map(|(distance, count)| distance * count)
            .sum();

        DebugStats {
            populated: self.population,
            capacity: self.capacity(),
            occupied_slots,
            zero_used: self.zero.is_some(),
            load_factor: self.population as f64 / self.capacity() as f64,
            max_probe_length: histogram.bins().len().saturating_sub(1),
            mean_probe_length: if occupied_slots == 0 {
                0.0
            } else {
                total_probe as f64 / occupied_slots as f64
            },
            total_bytes: self.cells.bytes(),
            wasted_bytes: (self.capacity() - occupied_slots) * core::mem::size_of::<Cell<V>>(),
        }
    }
}

impl<V> FromIterator<(u64, V)> for HashTable<V> {
    fn from_iter<I: IntoIterator<Item = (u64, V)>>(iter: I) -> Self {
        let mut table = HashTable::new();
        table.extend(iter);
        table
    }
}

impl<V, A: CellAllocator> Extend<(u64, V)> for HashTable<V, A> {
    fn extend<I: IntoIterator<Item = (u64, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

impl<'a, V, A: CellAllocator> IntoIterator for &'a HashTable<V, A> {
    type IntoIter = Iter<'a, V>;
    type Item = (u64, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, V, A: CellAllocator> IntoIterator for &'a mut HashTable<V, A> {
    type IntoIter = IterMut<'a, V>;
    type Item = (u64, &'a mut V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, V, A: CellAllocator = Global> {
    /// The key is present in the table
    Occupied(OccupiedEntry<'a, V, A>),
    /// The key is absent from the table
    Vacant(VacantEntry<'a, V, A>),
}

impl<'a, V, A: CellAllocator> Entry<'a, V, A> {
    /// The key this entry was requested for.
    pub fn key(&self) -> u64 {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }

    /// The handle of this entry. For a vacant entry it becomes valid once the
    /// entry is inserted.
    pub fn handle(&self) -> Handle {
        match self {
            Entry::Occupied(entry) => entry.handle(),
            Entry::Vacant(entry) => entry.handle(),
        }
    }

    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant and returns a
    /// mutable reference to the value.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Inserts `V::default()` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }

    /// Applies `f` to the value if the entry is occupied.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(8);
    /// table.entry(1).and_modify(|v| *v += 1).or_insert(1u32);
    /// table.entry(1).and_modify(|v| *v += 1).or_insert(1u32);
    /// assert_eq!(table.get(1), Some(&2));
    /// ```
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Self {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }
}

/// A view into an occupied entry in a [`HashTable`].
pub struct OccupiedEntry<'a, V, A: CellAllocator = Global> {
    table: &'a mut HashTable<V, A>,
    slot: Slot,
    key: u64,
}

impl<'a, V, A: CellAllocator> OccupiedEntry<'a, V, A> {
    /// The key of the entry.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// The handle of the entry.
    pub fn handle(&self) -> Handle {
        self.table.handle(self.slot, self.key)
    }

    /// Gets a reference to the value.
    pub fn get(&self) -> &V {
        self.table
            .slot_ref(self.slot)
            .expect("occupied entry holds a value")
    }

    /// Gets a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        self.table
            .slot_mut(self.slot)
            .expect("occupied entry holds a value")
    }

    /// Converts the entry into a mutable reference bound to the table's
    /// borrow.
    pub fn into_mut(self) -> &'a mut V {
        let OccupiedEntry { table, slot, .. } = self;
        table
            .slot_mut(slot)
            .expect("occupied entry holds a value")
    }

    /// Replaces the value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Deletes the entry and returns its value.
    pub fn remove(self) -> V {
        match self.slot {
            Slot::Zero => self
                .table
                .take_zero()
                .expect("occupied entry holds a value"),
            Slot::Index(index) => self.table.erase_index(index),
        }
    }
}

/// A view into a vacant entry in a [`HashTable`].
///
/// Room for the entry has already been made, so inserting never resizes.
pub struct VacantEntry<'a, V, A: CellAllocator = Global> {
    table: &'a mut HashTable<V, A>,
    slot: Slot,
    key: u64,
}

impl<'a, V, A: CellAllocator> VacantEntry<'a, V, A> {
    /// The key that would be inserted.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// The handle the entry will have once inserted.
    pub fn handle(&self) -> Handle {
        self.table.handle(self.slot, self.key)
    }

    /// Inserts `value` and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let VacantEntry { table, slot, key } = self;
        table.population += 1;
        debug_assert!(!exceeds_load(table.population, table.capacity()));

        match slot {
            Slot::Zero => table.zero.insert(value),
            Slot::Index(index) => {
                let cell = &mut table.cells.as_mut_slice()[index];
                debug_assert!(!cell.is_live());
                cell.key = key;
                cell.value.write(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use core::alloc::Layout;
    use core::ptr::NonNull;

    use hashbrown::HashMap;
    use hashbrown::HashSet;
    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;

    use super::*;

    /// Checks the structural invariants of the table.
    fn assert_invariants<V, A: CellAllocator>(table: &HashTable<V, A>) {
        let capacity = table.capacity();
        assert!(capacity.is_power_of_two());
        assert!(
            table.len() * 4 < capacity * 3,
            "load limit broken: {} in {}",
            table.len(),
            capacity
        );

        let mask = capacity - 1;
        let cells = table.cells.as_slice();
        let live = cells.iter().filter(|c| c.is_live()).count();
        assert_eq!(live + table.zero.is_some() as usize, table.len());

        let mut seen = HashSet::new();
        for (index, cell) in cells.iter().enumerate() {
            if !cell.is_live() {
                continue;
            }
            assert!(seen.insert(cell.key), "duplicate key {:#x}", cell.key);

            let mut probe = ideal_slot(cell.key, mask);
            while probe != index {
                assert!(
                    cells[probe].is_live(),
                    "hole at {probe} in chain of {:#x} stored at {index}: {:#?}",
                    cell.key,
                    table
                );
                probe = (probe + 1) & mask;
            }
        }
    }

    /// Finds `count` non-zero keys whose ideal slot in a table of `capacity`
    /// cells is `slot`.
    fn colliding_keys(slot: usize, capacity: usize, count: usize) -> Vec<u64> {
        (1u64..)
            .filter(|&k| ideal_slot(k, capacity - 1) == slot)
            .take(count)
            .collect()
    }

    #[test]
    fn zero_key_and_duplicate_insert() {
        let mut table: HashTable<u32> = HashTable::with_capacity(4);

        let (zero, created) = table.insert(0);
        assert!(created);
        let (five, created) = table.insert(5);
        assert!(created);
        let (again, created) = table.insert(5);
        assert!(!created);
        assert_eq!(five, again);

        let (zero_again, created) = table.insert(0);
        assert!(!created);
        assert_eq!(zero, zero_again);
        assert_eq!(table.len(), 2);

        assert_eq!(table.delete_key(0), Some(0));
        assert!(table.lookup(0).is_none());
        assert!(table.lookup(5).is_some());
        assert_eq!(table.len(), 1);
        assert_invariants(&table);
    }

    #[test]
    fn grows_from_small_capacity() {
        let mut table = HashTable::with_capacity(4);
        for key in 1..=10u64 {
            table.set(key, key * 3);
            assert_invariants(&table);
        }

        assert!(table.capacity() > 4);
        assert!(table.capacity().is_power_of_two());
        assert_eq!(table.capacity(), 16);
        for key in 1..=10u64 {
            assert_eq!(table.get(key), Some(&(key * 3)), "{:#?}", table);
        }
    }

    #[test]
    fn capacity_one_table() {
        let mut table = HashTable::new();
        assert_eq!(table.capacity(), 1);
        assert!(table.get(1).is_none());

        table.set(0, 'z');
        assert_eq!(table.capacity(), 2);
        table.set(1, 'a');
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.get(0), Some(&'z'));
        assert_eq!(table.get(1), Some(&'a'));
        assert_invariants(&table);
    }

    #[test]
    fn insert_and_find() {
        let mut rng = OsRng;
        let mut table = HashTable::with_capacity(0);
        let mut model = HashMap::new();

        for _ in 0..2000 {
            let key = rng.try_next_u64().unwrap();
            let value = rng.try_next_u64().unwrap();
            assert_eq!(table.set(key, value), model.insert(key, value));
        }

        assert_eq!(table.len(), model.len());
        for (key, value) in &model {
            assert_eq!(table.get(*key), Some(value));
        }
        assert_invariants(&table);
    }

    #[test]
    fn delete_keeps_other_keys_reachable() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..512u64 {
            table.set(k, k as i32);
        }

        for k in (0..512u64).step_by(3) {
            assert_eq!(table.delete_key(k), Some(k as i32));
            assert!(table.get(k).is_none());
        }
        assert_invariants(&table);

        for k in 0..512u64 {
            if k % 3 == 0 {
                assert!(!table.contains_key(k));
            } else {
                assert_eq!(table.get(k), Some(&(k as i32)), "{k}");
            }
        }
        assert!(table.delete_key(100_000).is_none());
    }

    #[test]
    fn explicit_collision() {
        let keys = colliding_keys(5, 16, 4);
        let mut table = HashTable::with_capacity(16);
        for &k in &keys {
            table.set(k, k);
        }
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.probe_histogram().bins(), [1, 1, 1, 1]);

        assert_eq!(table.delete_key(keys[1]), Some(keys[1]));
        assert_invariants(&table);
        assert_eq!(table.probe_histogram().bins(), [1, 1, 1]);
        for &k in [keys[0], keys[2], keys[3]].iter() {
            assert_eq!(table.get(k), Some(&k));
        }
    }

    #[test]
    fn collision_chain_wraps_around() {
        let keys = colliding_keys(15, 16, 3);
        let others = colliding_keys(0, 16, 2);
        let mut table = HashTable::with_capacity(16);
        for &k in keys.iter().chain(others.iter()) {
            table.set(k, k);
        }
        assert_invariants(&table);

        // The chain of slot 15 spills into slots 0 and 1, pushing the keys of
        // slot 0 further along. Deleting the head must pull everything back.
        table.delete_key(keys[0]);
        assert_invariants(&table);
        for &k in keys[1..].iter().chain(others.iter()) {
            assert_eq!(table.get(k), Some(&k));
        }

        table.delete_key(others[0]);
        assert_invariants(&table);
        assert_eq!(table.get(others[1]), Some(&others[1]));
    }

    #[test]
    fn randomized_against_model() {
        let mut rng = SmallRng::seed_from_u64(0x5eed_0f_7ab1e);
        let mut table: HashTable<u64> = HashTable::with_capacity(2);
        let mut model: HashMap<u64, u64> = HashMap::new();

        for step in 0..20_000u64 {
            let key = rng.random_range(0..300u64);
            if rng.random_bool(0.55) {
                let (handle, created) = table.insert(key);
                assert_eq!(created, !model.contains_key(&key));
                *table.resolve_mut(handle).unwrap() = step;
                model.insert(key, step);
                assert!(!exceeds_load(table.len(), table.capacity()));
            } else {
                assert_eq!(
                    table.delete_key(key).is_some(),
                    model.remove(&key).is_some()
                );
            }
            assert_eq!(table.len(), model.len());

            if step % 500 == 0 {
                assert_invariants(&table);
            }
        }

        assert_invariants(&table);
        for (key, value) in &model {
            assert_eq!(table.get(*key), Some(value));
        }
    }

    #[test]
    fn repopulate_preserves_entries() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..100u64 {
            table.set(k * 7919, k);
        }
        let before: HashSet<(u64, u64)> = table.iter().map(|(k, v)| (k, *v)).collect();

        table.repopulate(1024);
        assert_eq!(table.capacity(), 1024);
        assert_invariants(&table);
        let after: HashSet<(u64, u64)> = table.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(before, after);

        table.repopulate(256);
        assert_invariants(&table);
        let after: HashSet<(u64, u64)> = table.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn repopulate_rejects_bad_capacity() {
        let mut table = HashTable::with_capacity(16);
        for k in 1..=6u64 {
            table.set(k, ());
        }

        assert_eq!(table.try_repopulate(12), Err(Fault::NotPowerOfTwo(12)));
        assert_eq!(table.try_repopulate(0), Err(Fault::NotPowerOfTwo(0)));
        assert_eq!(
            table.try_repopulate(4),
            Err(Fault::Overloaded {
                population: 6,
                capacity: 4
            })
        );
        assert_eq!(table.capacity(), 16);

        // Exactly 75% is accepted.
        assert_eq!(table.try_repopulate(8), Ok(()));
        assert_eq!(table.capacity(), 8);
        for k in 1..=6u64 {
            assert!(table.contains_key(k));
        }
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn repopulate_panics_on_non_power_of_two() {
        let mut table: HashTable<()> = HashTable::with_capacity(4);
        table.repopulate(6);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn repopulate_panics_when_overloaded() {
        let mut table = HashTable::with_capacity(8);
        for k in 1..=5u64 {
            table.set(k, ());
        }
        table.repopulate(4);
    }

    #[test]
    fn compact_shrinks_to_minimum() {
        let mut table = HashTable::with_capacity(64);
        for k in [11u64, 22, 33] {
            table.set(k, k.to_string());
        }

        table.compact();
        assert_eq!(table.capacity(), 8);
        assert_invariants(&table);
        for k in [11u64, 22, 33] {
            assert_eq!(table.get(k), Some(&k.to_string()));
        }
    }

    #[test]
    fn compact_after_clear_and_removals() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..1000u64 {
            table.set(k, k);
        }
        for k in 10..1000u64 {
            table.delete_key(k);
        }

        table.compact();
        assert_eq!(table.capacity(), 16);
        assert_invariants(&table);
        for k in 0..10u64 {
            assert_eq!(table.get(k), Some(&k));
        }

        table.clear();
        table.compact();
        assert_eq!(table.capacity(), 1);
        assert!(table.is_empty());

        table.set(3, 3);
        assert_eq!(table.get(3), Some(&3));
    }

    #[test]
    fn iteration_yields_every_entry_once() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..300u64 {
            table.set(k, k + 1);
        }
        for k in (0..300u64).step_by(4) {
            table.delete_key(k + 1);
        }

        let keys: Vec<u64> = table.keys().collect();
        assert_eq!(keys.len(), table.len());
        let unique: HashSet<u64> = keys.iter().copied().collect();
        assert_eq!(unique.len(), keys.len());
        for k in &keys {
            assert!(table.contains_key(*k));
        }
        assert_eq!(table.iter().len(), table.len());
        assert_eq!(
            table.values().map(|v| *v).sum::<u64>(),
            keys.iter().map(|k| k + 1).sum::<u64>()
        );
    }

    #[test]
    fn iteration_order_is_zero_then_slots() {
        let mut table = HashTable::with_capacity(16);
        for k in [0u64, 9, 4, 100] {
            table.set(k, ());
        }

        let keys: Vec<u64> = table.keys().collect();
        assert_eq!(keys[0], 0);
        let positions: Vec<usize> = keys[1..]
            .iter()
            .map(|&k| match table.lookup(k).unwrap().slot {
                Slot::Index(index) => index,
                Slot::Zero => unreachable!(),
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");

        table.delete_key(0);
        assert_ne!(table.keys().next(), Some(0));
        assert_eq!(table.keys().count(), 3);
    }

    #[test]
    fn handles_resolve_and_delete() {
        let mut table = HashTable::with_capacity(32);
        for k in 0..10u64 {
            table.set(k, k * 2);
        }

        let handles: Vec<Handle> = table.handles().collect();
        assert_eq!(handles.len(), 10);
        for handle in &handles {
            assert_eq!(table.resolve(*handle), Some(&(handle.key() * 2)));
        }

        for handle in handles {
            let (key, value) = table.try_delete(handle).unwrap_or_else(|fault| {
                // A shifted entry invalidates its old handle; re-lookup.
                assert!(matches!(fault, Fault::NotLive { .. }), "{fault}");
                let fresh = table.lookup(handle.key()).unwrap();
                table.try_delete(fresh).unwrap()
            });
            assert_eq!(value, key * 2);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn handles_survive_non_growing_insert() {
        let mut table = HashTable::with_capacity(64);
        let (handle, _) = table.insert_with(77, || "x");
        for k in 1..20u64 {
            table.set(k, "y");
        }
        assert_eq!(table.capacity(), 64);
        assert_eq!(table.resolve(handle), Some(&"x"));
    }

    #[test]
    fn growth_invalidates_handles() {
        let mut table = HashTable::with_capacity(4);
        let (handle, _) = table.insert_with(1, || 1);
        let (zero, _) = table.insert_with(0, || 0);
        table.set(2, 2);
        assert!(table.capacity() > 4);

        assert!(table.resolve(handle).is_none());
        assert!(matches!(
            table.try_delete(handle),
            Err(Fault::StaleHandle { .. })
        ));
        assert!(matches!(
            table.try_delete(zero),
            Err(Fault::StaleHandle { .. })
        ));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn shifted_entry_invalidates_handle() {
        let keys = colliding_keys(2, 16, 2);
        let mut table = HashTable::with_capacity(16);
        let (first, _) = table.insert_with(keys[0], || 'a');
        let (second, _) = table.insert_with(keys[1], || 'b');

        assert_eq!(table.delete(first), 'a');
        assert_eq!(
            table.try_delete(second),
            Err(Fault::NotLive {
                index: 3,
                key: keys[1]
            })
        );

        let moved = table.lookup(keys[1]).unwrap();
        assert_ne!(moved, second);
        assert_eq!(table.resolve(moved), Some(&'b'));
    }

    #[test]
    fn double_delete_faults() {
        let mut table = HashTable::with_capacity(8);
        table.set(0, 1);
        table.set(6, 2);
        let zero = table.lookup(0).unwrap();
        let six = table.lookup(6).unwrap();

        assert_eq!(table.delete(zero), 1);
        assert_eq!(table.try_delete(zero), Err(Fault::ZeroKeyAbsent));
        assert_eq!(table.delete(six), 2);
        assert!(matches!(table.try_delete(six), Err(Fault::NotLive { .. })));
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "deleting zero key entry when not used")]
    fn deleting_absent_zero_panics() {
        let mut table = HashTable::with_capacity(8);
        let (zero, _) = table.insert_with(0, || ());
        table.delete(zero);
        table.delete(zero);
    }

    #[test]
    #[should_panic(expected = "stale handle")]
    fn deleting_after_clear_panics() {
        let mut table = HashTable::with_capacity(8);
        let (handle, _) = table.insert_with(3, || ());
        table.clear();
        table.delete(handle);
    }

    #[test]
    fn out_of_bounds_handle_faults() {
        let mut table: HashTable<()> = HashTable::with_capacity(8);
        let handle = Handle::new(table.generation, Slot::Index(40), 7);
        assert_eq!(
            table.try_delete(handle),
            Err(Fault::OutOfBounds {
                index: 40,
                capacity: 8
            })
        );
    }

    #[test]
    fn handles_from_another_table_are_stale() {
        let mut first = HashTable::with_capacity(16);
        let mut second = HashTable::with_capacity(16);
        let (handle, _) = first.insert_with(9, || 'a');
        let (zero, _) = first.insert_with(0, || 'z');
        second.set(9, 'b');
        second.set(0, 'y');

        assert!(second.resolve(handle).is_none());
        assert!(matches!(
            second.try_delete(handle),
            Err(Fault::StaleHandle { .. })
        ));
        assert!(matches!(
            second.try_delete(zero),
            Err(Fault::StaleHandle { .. })
        ));
        assert_eq!(second.len(), 2);
        assert_eq!(first.resolve(handle), Some(&'a'));
    }

    #[test]
    fn entry_api() {
        let mut table: HashTable<String> = HashTable::with_capacity(4);

        table.entry(1).or_insert("one".to_string());
        table.entry(0).or_insert_with(|| "zero".to_string());
        table.entry(1).or_insert("ignored".to_string()).push('!');
        assert_eq!(table.get(1).map(String::as_str), Some("one!"));

        match table.entry(2) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), 2);
                let handle = entry.handle();
                entry.insert("two".to_string());
                assert_eq!(table.resolve(handle).map(String::as_str), Some("two"));
            }
            Entry::Occupied(_) => panic!("unexpected occupied entry"),
        }

        match table.entry(0) {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.get(), "zero");
                assert_eq!(entry.insert("nil".to_string()), "zero");
                assert_eq!(entry.remove(), "nil");
            }
            Entry::Vacant(_) => panic!("unexpected vacant entry"),
        }
        assert!(!table.contains_key(0));

        assert_eq!(table.entry(9).or_default(), "");
        assert_eq!(table.len(), 3);
        assert_invariants(&table);
    }

    #[test]
    fn iter_mut_and_drain() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..64u64 {
            table.set(k, k);
        }

        for (key, value) in table.iter_mut() {
            *value += key;
        }
        for (key, value) in &mut table {
            *value += key;
        }
        for k in 0..64u64 {
            assert_eq!(table.get(k), Some(&(k * 3)));
        }

        let capacity = table.capacity();
        let handle = table.lookup(5).unwrap();
        let mut drained: Vec<(u64, u64)> = table.drain().collect();
        drained.sort();
        assert_eq!(drained, (0..64u64).map(|k| (k, k * 3)).collect::<Vec<_>>());
        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert!(table.resolve(handle).is_none());
        assert_invariants(&table);

        table.set(5, 1);
        assert_eq!(table.get(5), Some(&1));
    }

    #[test]
    fn partial_drain_empties_table() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..20u64 {
            table.set(k, Rc::new(k));
        }
        let shared = table.get(7).unwrap().clone();

        let first = table.drain().next();
        assert_eq!(first.map(|(k, _)| k), Some(0));
        assert!(table.is_empty());
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    fn forgotten_partial_drain_leaves_table_consistent() {
        let keys = colliding_keys(3, 16, 2);
        let mut table = HashTable::with_capacity(16);
        table.set(keys[0], 1);
        table.set(keys[1], 2);

        let mut drain = table.drain();
        assert_eq!(drain.next(), Some((keys[0], 1)));
        core::mem::forget(drain);

        assert!(table.is_empty());
        assert!(!table.contains_key(keys[1]));
        assert_invariants(&table);

        table.set(keys[1], 3);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(keys[1]), Some(&3));
        assert_invariants(&table);
    }

    #[test]
    #[cfg(feature = "std")]
    fn clear_survives_panicking_destructor() {
        struct Fuse(bool);

        impl Drop for Fuse {
            fn drop(&mut self) {
                if self.0 {
                    panic!("fuse blew");
                }
            }
        }

        let mut table = HashTable::with_capacity(0);
        for k in 0..40u64 {
            table.set(k, Fuse(k == 17));
        }
        let capacity = table.capacity();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| table.clear()));
        assert!(result.is_err());

        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.iter().count(), 0);
        assert_invariants(&table);

        table.set(17, Fuse(false));
        assert_eq!(table.len(), 1);
        assert!(table.contains_key(17));
    }

    #[test]
    fn clear_drops_values() {
        let marker = Rc::new(());
        let mut table = HashTable::with_capacity(8);
        for k in 0..5u64 {
            table.set(k, marker.clone());
        }
        assert_eq!(Rc::strong_count(&marker), 6);

        table.clear();
        assert_eq!(Rc::strong_count(&marker), 1);
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 8);
        assert!(table.lookup(0).is_none());

        table.set(2, marker.clone());
        drop(table);
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn deleted_and_overwritten_values_are_dropped_once() {
        let marker = Rc::new(());
        let mut table = HashTable::with_capacity(0);
        for k in 0..100u64 {
            table.set(k, marker.clone());
        }
        for k in 0..50u64 {
            drop(table.delete_key(k));
        }
        for k in 50..60u64 {
            drop(table.set(k, marker.clone()));
        }
        table.compact();
        assert_eq!(Rc::strong_count(&marker), 51);
        drop(table);
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[derive(Default)]
    struct CountingAlloc {
        live: core::cell::Cell<isize>,
        total: core::cell::Cell<usize>,
    }

    // SAFETY: Forwards to `Global` unchanged, only counting calls.
    unsafe impl CellAllocator for CountingAlloc {
        fn allocate(&self, layout: Layout) -> NonNull<u8> {
            self.live.set(self.live.get() + 1);
            self.total.set(self.total.get() + 1);
            Global.allocate(layout)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            self.live.set(self.live.get() - 1);
            // SAFETY: Upheld by the caller.
            unsafe { Global.deallocate(ptr, layout) }
        }
    }

    #[test]
    fn custom_allocator_backs_every_store() {
        let alloc = CountingAlloc::default();
        {
            let mut table = HashTable::with_capacity_in(1, &alloc);
            for k in 0..100u64 {
                table.set(k, vec![k; 3]);
            }
            assert_eq!(alloc.live.get(), 1);
            table.compact();
            table.repopulate(1024);
            assert_eq!(alloc.live.get(), 1);

            let copy = table.clone();
            assert_eq!(alloc.live.get(), 2);
            assert_eq!(copy.get(42), Some(&vec![42; 3]));
        }
        assert_eq!(alloc.live.get(), 0);
        assert!(alloc.total.get() > 3);
    }

    #[test]
    fn clone_preserves_layout_and_handles() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..50u64 {
            table.set(k, k.to_string());
        }
        let handle = table.lookup(17).unwrap();

        let mut copy = table.clone();
        assert_eq!(copy.len(), table.len());
        assert_eq!(copy.capacity(), table.capacity());
        assert_eq!(copy.resolve(handle).map(String::as_str), Some("17"));
        assert!(copy.iter().eq(table.iter()));

        copy.delete_key(17);
        assert_eq!(table.get(17).map(String::as_str), Some("17"));
        assert_invariants(&copy);
    }

    #[test]
    fn collect_and_extend() {
        let mut table: HashTable<u64> = (1..=20u64).map(|k| (k, k * k)).collect();
        table.extend([(0, 0), (3, 0)]);
        assert_eq!(table.len(), 21);
        assert_eq!(table.get(3), Some(&0));
        assert_eq!(table.get(20), Some(&400));
    }

    #[test]
    fn debug_output() {
        let mut table = HashTable::with_capacity(8);
        let empty = alloc::format!("{:?}", table);
        assert!(empty.contains("HashTable"));

        table.set(0xabc, 1);
        let output = alloc::format!("{:?}", table);
        assert!(output.contains("0000000000000abc"), "{output}");
    }

    #[test]
    fn stats_report_probe_lengths() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..1000u64 {
            table.set(k, k);
        }

        let histogram = table.probe_histogram();
        assert_eq!(histogram.total(), 999);

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 1000);
        assert_eq!(stats.occupied_slots, 999);
        assert!(stats.zero_used);
        assert!(stats.load_factor < 0.75);
        assert_eq!(stats.max_probe_length + 1, histogram.bins().len());
        assert!(stats.mean_probe_length < 4.0, "{stats:?}");
        assert_eq!(
            stats.total_bytes,
            table.capacity() * core::mem::size_of::<Cell<u64>>()
        );
    }

    #[test]
    #[cfg(feature = "std")]
    fn stats_print() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..100u64 {
            table.set(k, ());
        }
        table.probe_histogram().print();
        table.debug_stats().print();
    }
}
