//! Capacity arithmetic for the 75% load limit.

/// Smallest power of two that is `>= n`, treating `0` as `1`.
///
/// # Panics
///
/// Panics if the result does not fit in a `usize`.
#[inline]
pub fn upper_power_of_two(n: usize) -> usize {
    n.max(1)
        .checked_next_power_of_two()
        .expect("capacity overflow")
}

/// Returns `true` when `population` entries would put a table of `capacity`
/// slots at or above 75% load.
#[inline(always)]
pub fn exceeds_load(population: usize, capacity: usize) -> bool {
    population.saturating_mul(4) >= capacity.saturating_mul(3)
}

/// Smallest capacity that keeps `population` entries strictly below 75%
/// load.
///
/// # Examples
///
/// ```rust
/// use probe_table::sizing::compact_capacity;
///
/// assert_eq!(compact_capacity(0), 1);
/// assert_eq!(compact_capacity(3), 8);
/// assert_eq!(compact_capacity(6), 16);
/// ```
#[inline]
pub fn compact_capacity(population: usize) -> usize {
    let scaled = population.checked_mul(4).expect("capacity overflow");
    upper_power_of_two((scaled + 3) / 3)
}
