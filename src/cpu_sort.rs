//! CPU Sorting Baseline
//!
//! Host-side sorts used to time and verify the bitonic network. Floats are
//! ordered with `f32::total_cmp`, which agrees with `<` on all non-NaN values.

use rayon::prelude::*;

/// Sort a slice in-place using unstable sort (typically faster than stable sort).
///
/// Uses Rust's built-in pattern-defeating quicksort.
#[inline]
pub fn sort_unstable(data: &mut [f32]) {
    data.sort_unstable_by(f32::total_cmp);
}

/// Parallel unstable sort using rayon's parallel pdqsort.
///
/// The multi-threaded baseline: on machines with many cores this is the
/// number the GPU has to beat.
pub fn parallel_sort(data: &mut [f32]) {
    data.par_sort_unstable_by(f32::total_cmp);
}

/// Check if a slice is sorted in ascending order.
#[inline]
pub fn is_sorted(data: &[f32]) -> bool {
    data.windows(2).all(|w| w[0] <= w[1])
}
