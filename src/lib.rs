#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod allocator;

mod cells;

pub mod error;

pub mod hash_table;

pub mod iter;

/// A set of integer keys built on the `HashTable`.
///
/// This module provides an `IntSet` that wraps a `HashTable<()>` and offers
/// a standard set interface.
pub mod int_set;

pub mod mix;

pub mod sizing;

pub use allocator::CellAllocator;
pub use allocator::Global;
pub use error::Fault;
pub use hash_table::Entry;
pub use hash_table::Handle;
pub use hash_table::HashTable;
#[cfg(any(test, feature = "stats"))]
pub use hash_table::DebugStats;
#[cfg(any(test, feature = "stats"))]
pub use hash_table::ProbeHistogram;
pub use int_set::IntSet;
