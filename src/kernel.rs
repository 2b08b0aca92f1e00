//! Compare-exchange kernel contract.
//!
//! Every backend runs the same per-lane function, one lane per element:
//!
//! ```text
//! distance  = 2^(stage - step)
//! partner   = lane ^ distance
//! ascending = (lane & 2^(stage + 1)) == 0
//! left, right = input[min(lane, partner)], input[max(lane, partner)]
//! output[lane] = (left > right) == ascending ? input[partner] : input[lane]
//! ```
//!
//! `>` is taken on [`order_key`], the `f32::total_cmp` order, so NaN and
//! signed zeros have fixed positions and a NaN fill still sorts to the tail.
//! Both lanes of a pair evaluate the same predicate, so each pass writes a
//! permutation of its input. The WGSL and MSL sources live in `shaders/`.

use std::cmp::Ordering;

use crate::schedule::PassDescriptor;

/// Lanes per workgroup (threadgroup on Metal). Must match the shaders.
pub const WORKGROUP_SIZE: u32 = 64;

/// WGSL source of the compare-exchange kernel.
pub const WGSL_SOURCE: &str = include_str!("../shaders/compare_exchange.wgsl");

/// Metal Shading Language source of the compare-exchange kernel.
pub const MSL_SOURCE: &str = include_str!("../shaders/compare_exchange.metal");

/// Name of the kernel entry point in both shader sources.
pub const ENTRY_POINT: &str = "compare_exchange";

/// Value lane `lane` holds after `pass` is applied to `input`.
///
/// `input.len()` must be a power of two larger than the pass's compare
/// distance.
#[inline]
pub fn compare_exchange_lane(input: &[f32], lane: usize, pass: PassDescriptor) -> f32 {
    let partner = lane ^ pass.compare_distance();
    let ascending = (lane & pass.block_size()) == 0;
    let (lower, upper) = if lane < partner {
        (lane, partner)
    } else {
        (partner, lane)
    };
    if (input[lower].total_cmp(&input[upper]) == Ordering::Greater) == ascending {
        input[partner]
    } else {
        input[lane]
    }
}

/// Unsigned key ordered like `f32::total_cmp`. The shaders compute the same key.
#[inline]
pub fn order_key(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Number of workgroups needed to cover `lanes`.
#[inline]
pub fn workgroup_count(lanes: usize) -> u32 {
    lanes.div_ceil(WORKGROUP_SIZE as usize) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::PassSchedule;

    fn apply(values: &[f32], pass: PassDescriptor) -> Vec<f32> {
        (0..values.len())
            .map(|lane| compare_exchange_lane(values, lane, pass))
            .collect()
    }

    #[test]
    fn test_first_stage_alternates_direction() {
        let out = apply(&[5.0, 3.0, 8.0, 1.0], PassDescriptor::new(0, 0));
        assert_eq!(out, vec![3.0, 5.0, 8.0, 1.0]);
    }

    #[test]
    fn test_full_network_four_elements() {
        let mut values = vec![5.0, 3.0, 8.0, 1.0];
        let mut trace = Vec::new();
        for pass in PassSchedule::new(2) {
            values = apply(&values, pass);
            trace.push(values.clone());
        }
        assert_eq!(trace[0], vec![3.0, 5.0, 8.0, 1.0]);
        assert_eq!(trace[1], vec![3.0, 1.0, 8.0, 5.0]);
        assert_eq!(trace[2], vec![1.0, 3.0, 5.0, 8.0]);
    }

    #[test]
    fn test_each_pass_is_a_permutation() {
        let original: Vec<f32> = (0..64).map(|i| ((i * 37) % 64) as f32).collect();
        let mut values = original.clone();
        for pass in PassSchedule::new(6) {
            values = apply(&values, pass);
            let mut a = values.clone();
            let mut b = original.clone();
            a.sort_by(f32::total_cmp);
            b.sort_by(f32::total_cmp);
            assert_eq!(a, b, "pass {pass} lost elements");
        }
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_duplicates_are_preserved() {
        let mut values = vec![2.0, 2.0, 1.0, 2.0, 1.0, 1.0, 2.0, 1.0];
        for pass in PassSchedule::new(3) {
            values = apply(&values, pass);
        }
        assert_eq!(values, vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_order_key_matches_total_cmp() {
        let values = [
            f32::NEG_INFINITY,
            -1.5,
            -0.0,
            0.0,
            1e-40,
            2.0,
            f32::INFINITY,
            f32::NAN,
            -f32::NAN,
        ];
        for a in values {
            for b in values {
                assert_eq!(
                    order_key(a).cmp(&order_key(b)),
                    a.total_cmp(&b),
                    "{a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn test_nan_padding_sorts_to_tail() {
        let mut values = vec![1.0, f32::NAN, 2.0, f32::NAN];
        for pass in PassSchedule::new(2) {
            values = apply(&values, pass);
        }
        assert_eq!(&values[..2], &[1.0, 2.0]);
        assert!(values[2..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(64), 1);
        assert_eq!(workgroup_count(65), 2);
        assert_eq!(workgroup_count(1 << 20), (1 << 20) / 64);
    }
}
