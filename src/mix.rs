//! The fixed integer mixer used to place keys.
//!
//! Keys are spread with the 64-bit finalizer from MurmurHash3. It is a
//! bijection on `u64`, so distinct keys never collide before masking, and it
//! avalanches well enough that sequential keys land far apart.

/// Mixes a 64-bit key into a well-distributed 64-bit hash.
///
/// The result is deterministic across runs and platforms. Note that
/// `mix(0) == 0`; the table never hashes key `0` since that key lives in its
/// own out-of-band cell.
///
/// # Examples
///
/// ```rust
/// use probe_table::mix::mix;
///
/// assert_eq!(mix(42), mix(42));
/// assert_ne!(mix(1), mix(2));
/// ```
#[inline(always)]
pub const fn mix(key: u64) -> u64 {
    let mut h = key;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// Index of the slot `key` would occupy without collisions.
///
/// `mask` is `capacity - 1` for a power-of-two capacity, which makes this
/// `mix(key) mod capacity`.
#[inline(always)]
pub(crate) fn ideal_slot(key: u64, mask: usize) -> usize {
    mix(key) as usize & mask
}

/// Circular distance walked forward from `from` to reach `to`, in
/// `0..capacity`.
#[inline(always)]
pub(crate) fn circular_distance(from: usize, to: usize, mask: usize) -> usize {
    to.wrapping_sub(from) & mask
}
