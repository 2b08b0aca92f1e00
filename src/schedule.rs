//! Pass schedule for the bitonic sorting network.
//!
//! A network over `2^k` elements runs `k` stages. Stage `s` merges bitonic
//! blocks of `2^(s+1)` elements and takes `s + 1` steps, starting at compare
//! distance `2^s` and halving down to 1. The scheduler only emits the
//! `(stage, step)` pairs; which lanes compare and in which direction is
//! decided by the kernel.

use std::fmt;
use std::iter::FusedIterator;

use crate::error::{SortError, SortResult};

/// One compare-exchange pass over the whole array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassDescriptor {
    pub stage: u32,
    pub step: u32,
}

impl PassDescriptor {
    pub const fn new(stage: u32, step: u32) -> Self {
        Self { stage, step }
    }

    /// Size of the bitonic blocks merged in this pass's stage.
    #[inline]
    pub fn block_size(&self) -> usize {
        2usize << self.stage
    }

    /// Distance between the two lanes of a compare-exchange pair.
    #[inline]
    pub fn compare_distance(&self) -> usize {
        1usize << (self.stage - self.step)
    }
}

impl fmt::Display for PassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(stage {}, step {})", self.stage, self.step)
    }
}

/// Number of passes in a network with `stage_count` stages.
#[inline]
pub const fn total_passes(stage_count: u32) -> usize {
    let k = stage_count as usize;
    k * (k + 1) / 2
}

/// Number of stages needed for `padded_len` elements, i.e. `log2(padded_len)`.
#[inline]
pub fn stage_count(padded_len: usize) -> u32 {
    padded_len.trailing_zeros()
}

/// Build the schedule for a power-of-two length.
pub fn schedule_for(padded_len: usize) -> SortResult<PassSchedule> {
    if !padded_len.is_power_of_two() {
        return Err(SortError::invalid_input(format!(
            "network size must be a power of 2, got {padded_len}"
        )));
    }
    Ok(PassSchedule::new(stage_count(padded_len)))
}

/// Lazily produced, restartable sequence of passes in `(stage, step)` order.
///
/// A clone continues from the same cursor; [`PassSchedule::new`] starts over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSchedule {
    stage_count: u32,
    stage: u32,
    step: u32,
}

impl PassSchedule {
    pub fn new(stage_count: u32) -> Self {
        Self {
            stage_count,
            stage: 0,
            step: 0,
        }
    }

    pub fn stage_count(&self) -> u32 {
        self.stage_count
    }

    pub fn total_passes(&self) -> usize {
        total_passes(self.stage_count)
    }

    /// Index the next yielded pass will have.
    fn position(&self) -> usize {
        total_passes(self.stage) + self.step as usize
    }
}

impl Iterator for PassSchedule {
    type Item = PassDescriptor;

    fn next(&mut self) -> Option<PassDescriptor> {
        if self.stage >= self.stage_count {
            return None;
        }
        let pass = PassDescriptor::new(self.stage, self.step);
        if self.step == self.stage {
            self.stage += 1;
            self.step = 0;
        } else {
            self.step += 1;
        }
        Some(pass)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_passes().saturating_sub(self.position());
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PassSchedule {}

impl FusedIterator for PassSchedule {}
