//! Padding of arbitrary-length input to a power-of-two network size.
//!
//! The bitonic network only sorts `2^k` elements. Shorter inputs are filled
//! with a sentinel that must compare `>=` every real element so the fill
//! sorts to the tail and is cut off by the final truncation.

use crate::error::{SortError, SortResult};
use crate::schedule::{stage_count, total_passes};

/// How the slots beyond the input length are filled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FillPolicy {
    /// Fill with the input's maximum under `f32::total_cmp`. Always safe.
    #[default]
    InputMax,
    /// Fill with a fixed value. Rejected if any input element exceeds it.
    Fixed(f32),
}

impl FillPolicy {
    /// Only called when padding is needed.
    fn resolve(&self, values: &[f32]) -> SortResult<f32> {
        let max = values
            .iter()
            .copied()
            .max_by(f32::total_cmp)
            .unwrap_or(f32::NEG_INFINITY);
        match *self {
            FillPolicy::InputMax => Ok(max),
            FillPolicy::Fixed(fill) if fill.total_cmp(&max).is_ge() => Ok(fill),
            FillPolicy::Fixed(fill) => Err(SortError::invalid_input(format!(
                "fill value {fill} is below input maximum {max}; padding would displace real data"
            ))),
        }
    }
}

/// A planned sort: the padded array plus what is needed to undo the padding.
#[derive(Debug, Clone, PartialEq)]
pub struct SortJob {
    pub padded: Vec<f32>,
    pub original_len: usize,
    /// `None` when the input length is already a power of two.
    pub fill_value: Option<f32>,
}

impl SortJob {
    pub fn padded_len(&self) -> usize {
        self.padded.len()
    }

    pub fn stage_count(&self) -> u32 {
        stage_count(self.padded.len())
    }

    pub fn total_passes(&self) -> usize {
        total_passes(self.stage_count())
    }

    pub fn padding(&self) -> usize {
        self.padded.len() - self.original_len
    }
}

/// Plan a job for `values`.
///
/// Positions below `values.len()` are copied in order; the rest hold the
/// fill value. A power-of-two length is copied unchanged and the fill
/// policy is not consulted.
pub fn plan(values: &[f32], policy: FillPolicy) -> SortResult<SortJob> {
    if values.is_empty() {
        return Err(SortError::invalid_input("cannot sort an empty array"));
    }

    if values.len().is_power_of_two() {
        return Ok(SortJob {
            padded: values.to_vec(),
            original_len: values.len(),
            fill_value: None,
        });
    }

    let fill_value = policy.resolve(values)?;
    let padded_len = values.len().next_power_of_two();

    let mut padded = Vec::with_capacity(padded_len);
    padded.extend_from_slice(values);
    padded.resize(padded_len, fill_value);

    Ok(SortJob {
        padded,
        original_len: values.len(),
        fill_value: Some(fill_value),
    })
}
