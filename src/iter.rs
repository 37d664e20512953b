//! Iterators over a [`HashTable`].
//!
//! Every iterator visits the key-0 entry first, if present, and then the
//! main array in slot order. Each live entry is produced exactly once. The
//! table is borrowed for the iterator's lifetime, so it cannot be mutated
//! mid-iteration.

use core::iter::FusedIterator;

use crate::allocator::CellAllocator;
use crate::allocator::Global;
use crate::cells::Cell;
use crate::cells::RawCells;
use crate::hash_table::Handle;
use crate::hash_table::HashTable;
use crate::hash_table::Slot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    Zero,
    Index(usize),
    Done,
}

/// Position of the first live cell at or after `from`.
#[inline]
fn seek<V>(cells: &[Cell<V>], from: usize) -> Position {
    match cells[from..].iter().position(Cell::is_live) {
        Some(offset) => Position::Index(from + offset),
        None => Position::Done,
    }
}

/// An iterator over the handles of a [`HashTable`]'s entries.
///
/// This struct is created by [`HashTable::handles`]. It is a cursor that
/// always rests on the next entry to yield, or is exhausted.
pub struct Handles<'a, V> {
    cells: &'a [Cell<V>],
    position: Position,
    generation: u64,
    remaining: usize,
}

impl<'a, V> Handles<'a, V> {
    pub(crate) fn new(zero_used: bool, cells: &'a [Cell<V>], generation: u64, len: usize) -> Self {
        let position = if zero_used {
            Position::Zero
        } else {
            seek(cells, 0)
        };

        Handles {
            cells,
            position,
            generation,
            remaining: len,
        }
    }

    /// Yields the current slot and moves the cursor to the next live entry.
    #[inline]
    fn next_slot(&mut self) -> Option<(Slot, u64)> {
        let (current, from) = match self.position {
            Position::Zero => ((Slot::Zero, 0), 0),
            Position::Index(index) => ((Slot::Index(index), self.cells[index].key), index + 1),
            Position::Done => return None,
        };

        self.position = seek(self.cells, from);
        self.remaining -= 1;
        Some(current)
    }
}

impl<V> Iterator for Handles<'_, V> {
    type Item = Handle;

    fn next(&mut self) -> Option<Self::Item> {
        let (slot, key) = self.next_slot()?;
        Some(Handle::new(self.generation, slot, key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Handles<'_, V> {}
impl<V> FusedIterator for Handles<'_, V> {}

/// An iterator over the `(key, &value)` pairs of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter`].
pub struct Iter<'a, V> {
    handles: Handles<'a, V>,
    zero: Option<&'a V>,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(handles: Handles<'a, V>, zero: Option<&'a V>) -> Self {
        Iter { handles, zero }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (u64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let cells = self.handles.cells;
        match self.handles.next_slot()? {
            (Slot::Zero, key) => Some((key, self.zero?)),
            (Slot::Index(index), key) => {
                // SAFETY: The cursor only rests on live cells, whose values are
                // initialized.
                Some((key, unsafe { cells[index].value.assume_init_ref() }))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.handles.size_hint()
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}
impl<V> FusedIterator for Iter<'_, V> {}

/// An iterator over the `(key, &mut value)` pairs of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter_mut`].
pub struct IterMut<'a, V> {
    zero: Option<&'a mut V>,
    cells: core::slice::IterMut<'a, Cell<V>>,
    remaining: usize,
}

impl<'a, V> IterMut<'a, V> {
    pub(crate) fn new(zero: Option<&'a mut V>, cells: &'a mut [Cell<V>], len: usize) -> Self {
        IterMut {
            zero,
            cells: cells.iter_mut(),
            remaining: len,
        }
    }
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = (u64, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(value) = self.zero.take() {
            self.remaining -= 1;
            return Some((0, value));
        }

        for cell in self.cells.by_ref() {
            if cell.is_live() {
                self.remaining -= 1;
                let key = cell.key;
                // SAFETY: The cell is live, so its value is initialized.
                return Some((key, unsafe { cell.value.assume_init_mut() }));
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}
impl<V> FusedIterator for IterMut<'_, V> {}

/// An iterator over the keys of a [`HashTable`].
pub struct Keys<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> Keys<'a, V> {
    pub(crate) fn new(iter: Iter<'a, V>) -> Self {
        Self { inner: iter }
    }
}

impl<V> Iterator for Keys<'_, V> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Keys<'_, V> {}
impl<V> FusedIterator for Keys<'_, V> {}

/// An iterator over the values of a [`HashTable`].
pub struct Values<'a, V> {
    inner: Iter<'a, V>,
}

impl<'a, V> Values<'a, V> {
    pub(crate) fn new(iter: Iter<'a, V>) -> Self {
        Self { inner: iter }
    }
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Values<'_, V> {}
impl<V> FusedIterator for Values<'_, V> {}

/// A draining iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::drain`]. The table is emptied up
/// front and the iterator owns the old store, yielding its `(key, value)`
/// pairs. Dropping the iterator drops whatever was not yielded; leaking it
/// leaks those entries but leaves the table intact.
pub struct Drain<'a, V, A: CellAllocator = Global> {
    table: &'a mut HashTable<V, A>,
    cells: RawCells<V>,
    zero: Option<V>,
    next_index: usize,
    remaining: usize,
}

impl<'a, V, A: CellAllocator> Drain<'a, V, A> {
    pub(crate) fn new(table: &'a mut HashTable<V, A>) -> Self {
        let (cells, zero, remaining) = table.detach_store();
        Drain {
            table,
            cells,
            zero,
            next_index: 0,
            remaining,
        }
    }
}

impl<V, A: CellAllocator> Drop for Drain<'_, V, A> {
    fn drop(&mut self) {
        for _ in &mut *self {}
        // SAFETY: The store was detached from this table in `new` and every
        // value has now been moved out of it.
        unsafe { self.table.release_store(&mut self.cells) };
    }
}

impl<V, A: CellAllocator> Iterator for Drain<'_, V, A> {
    type Item = (u64, V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(value) = self.zero.take() {
            self.remaining -= 1;
            return Some((0, value));
        }

        let cells = self.cells.as_mut_slice();
        let Some(offset) = cells[self.next_index..].iter().position(Cell::is_live) else {
            self.next_index = cells.len();
            return None;
        };

        let index = self.next_index + offset;
        let key = cells[index].key;
        // SAFETY: `index` was found live.
        let value = unsafe { cells[index].take() };
        self.next_index = index + 1;
        self.remaining -= 1;
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V, A: CellAllocator> ExactSizeIterator for Drain<'_, V, A> {}
impl<V, A: CellAllocator> FusedIterator for Drain<'_, V, A> {}
