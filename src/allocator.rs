//! The hook through which tables obtain their cell storage.
//!
//! Every backing store a [`HashTable`](crate::HashTable) uses is a single
//! contiguous block requested from a [`CellAllocator`]. The default,
//! [`Global`], forwards to the global Rust allocator. An arena or off-heap
//! region can be plugged in without touching the table algorithm.

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::ptr::NonNull;

/// A source of contiguous blocks of table cells.
///
/// # Safety
///
/// - `allocate` must return a pointer to a block that is valid for reads and
///   writes of `layout.size()` bytes, aligned to `layout.align()`, and not
///   aliased by any other live allocation. It must not return on failure;
///   diverge (for example through [`handle_alloc_error`]) instead.
/// - `deallocate` is only ever called with a pointer and layout previously
///   returned from / passed to `allocate` on the same allocator.
///
/// Tables never request zero-sized blocks.
pub unsafe trait CellAllocator {
    /// Allocates a block described by `layout`.
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Releases a block obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global Rust allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Global;

// SAFETY: Defers to `alloc::alloc`, which upholds the allocation contract for
// non-zero-sized layouts, and aborts through `handle_alloc_error` on failure.
unsafe impl CellAllocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        debug_assert!(layout.size() != 0);
        // SAFETY: Tables never request zero-sized layouts.
        let raw = unsafe { alloc::alloc::alloc(layout) };
        match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller guarantees `ptr` came from `allocate` with `layout`.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

// SAFETY: Forwards both calls to the referenced allocator unchanged.
unsafe impl<A: CellAllocator + ?Sized> CellAllocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Upheld by the caller.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}
