use core::alloc::Layout;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::allocator::CellAllocator;

/// Key marking a cell of the main array as unused.
pub(crate) const VACANT: u64 = 0;

/// One slot of the main array.
///
/// `value` is initialized exactly when `key != VACANT`.
pub(crate) struct Cell<V> {
    pub(crate) key: u64,
    pub(crate) value: MaybeUninit<V>,
}

impl<V> Cell<V> {
    #[inline(always)]
    pub(crate) const fn vacant() -> Self {
        Cell {
            key: VACANT,
            value: MaybeUninit::uninit(),
        }
    }

    #[inline(always)]
    pub(crate) fn is_live(&self) -> bool {
        self.key != VACANT
    }

    /// Moves the value out and marks the cell vacant.
    ///
    /// # Safety
    ///
    /// The cell must be live.
    #[inline(always)]
    pub(crate) unsafe fn take(&mut self) -> V {
        debug_assert!(self.is_live());
        self.key = VACANT;
        // SAFETY: Caller guarantees the cell was live, so the value is
        // initialized. The cell is now vacant and the value is never read
        // again.
        unsafe { self.value.assume_init_read() }
    }
}

/// A block of cells obtained from a [`CellAllocator`].
///
/// Every cell in the block is initialized to vacant on allocation. The block
/// does not own the values stored in it: releasing it never runs their
/// destructors, that is the table's job.
pub(crate) struct RawCells<V> {
    ptr: NonNull<Cell<V>>,
    len: usize,
}

impl<V> RawCells<V> {
    /// Allocates `len` vacant cells.
    pub(crate) fn allocate<A: CellAllocator>(alloc: &A, len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        let layout = Self::layout(len);
        let ptr = alloc.allocate(layout).cast::<Cell<V>>();

        // SAFETY: The allocator returned a block valid for `len` cells with the
        // alignment of `Cell<V>`. Each write stays within it.
        unsafe {
            for index in 0..len {
                ptr.add(index).write(Cell::vacant());
            }
        }

        RawCells { ptr, len }
    }

    fn layout(len: usize) -> Layout {
        Layout::array::<Cell<V>>(len).expect("allocation size overflow")
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Size in bytes of the block.
    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn bytes(&self) -> usize {
        Self::layout(self.len).size()
    }

    #[inline(always)]
    pub(crate) fn as_slice(&self) -> &[Cell<V>] {
        // SAFETY: `ptr` points to `len` initialized cells that live as long as
        // `self`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline(always)]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [Cell<V>] {
        // SAFETY: `ptr` points to `len` initialized cells that live as long as
        // `self`, and `&mut self` guarantees exclusivity.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the block to `alloc` without dropping any values.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator the block came from, and the block must
    /// not be used afterwards.
    pub(crate) unsafe fn deallocate<A: CellAllocator>(&mut self, alloc: &A) {
        // SAFETY: Upheld by the caller; the layout matches the one used in
        // `allocate`.
        unsafe { alloc.deallocate(self.ptr.cast(), Self::layout(self.len)) }
    }
}

/// Marks every cell of a slice vacant when dropped, without dropping values.
///
/// Guards bulk drops of cell values: if a destructor panics, the cells are
/// still vacated and the remaining values leak.
pub(crate) struct VacateOnDrop<'a, V> {
    cells: &'a mut [Cell<V>],
}

impl<'a, V> VacateOnDrop<'a, V> {
    pub(crate) fn new(cells: &'a mut [Cell<V>]) -> Self {
        VacateOnDrop { cells }
    }

    pub(crate) fn iter_mut(&mut self) -> core::slice::IterMut<'_, Cell<V>> {
        self.cells.iter_mut()
    }
}

impl<V> Drop for VacateOnDrop<'_, V> {
    fn drop(&mut self) {
        for cell in self.cells.iter_mut() {
            cell.key = VACANT;
        }
    }
}
