//! Contract faults raised by table operations.

use thiserror::Error;

/// A violated calling contract.
///
/// These are programmer errors rather than runtime conditions: the
/// panicking operations ([`delete`], [`repopulate`]) abort with the fault's
/// message, while their `try_` forms hand it back. A lookup miss is never a
/// fault; it is reported as `None`.
///
/// [`delete`]: crate::HashTable::delete
/// [`repopulate`]: crate::HashTable::repopulate
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The handle names the key-0 entry but it is not present.
    #[error("deleting zero key entry when not used")]
    ZeroKeyAbsent,

    /// The handle was issued before the backing store was rebuilt or wiped.
    #[error("stale handle: issued at generation {handle}, table is at generation {table}")]
    StaleHandle {
        /// Generation the handle was issued at.
        handle: u64,
        /// Current generation of the table.
        table: u64,
    },

    /// The handle's slot index is outside the backing store.
    #[error("cell out of bounds: index {index} >= capacity {capacity}")]
    OutOfBounds {
        /// Slot index carried by the handle.
        index: usize,
        /// Slot count of the current store.
        capacity: usize,
    },

    /// The handle's slot no longer holds its key (deleted or shifted).
    #[error("cell {index} does not hold key {key:#x}")]
    NotLive {
        /// Slot index carried by the handle.
        index: usize,
        /// Key the handle was issued for.
        key: u64,
    },

    /// A requested capacity is not a power of two.
    #[error("capacity {0} is not a power of two")]
    NotPowerOfTwo(usize),

    /// A requested capacity cannot hold the population below 75% load.
    #[error("population {population} does not fit in capacity {capacity}")]
    Overloaded {
        /// Live entries in the table.
        population: usize,
        /// Requested slot count.
        capacity: usize,
    },
}
