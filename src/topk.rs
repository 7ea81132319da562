//! Bounded tracker for the k best (lowest) costs seen so far.

use crate::error::{Error, Result};
use std::collections::BinaryHeap;

/// Heap entry; `BinaryHeap` is a max-heap, so the root is the current
/// worst retained cost. Costs are finite, so the ordering is total.
#[derive(PartialEq, PartialOrd)]
struct Cost(f32);

impl Eq for Cost {}

#[allow(clippy::derive_ord_xor_partial_ord)]
impl Ord for Cost {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.partial_cmp(other).expect("cost must not be NaN")
    }
}

/// Keeps the `k` smallest costs inserted so far.
///
/// Used by beam search and result merging to short-circuit enumeration
/// as soon as the frontier cannot improve the current top k. Ties at the
/// cut-off are rejected, so equal-cost entries keep insertion order.
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Cost>,
}

impl TopK {
    /// Create a tracker for the `k` best costs. `k` must be positive.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::Config("top k must be positive".into()));
        }
        Ok(Self { k, heap: BinaryHeap::with_capacity(k + 1) })
    }

    /// Insert `cost`, evicting the current worst if the tracker is full.
    /// Returns whether the cost was retained.
    pub fn insert(&mut self, cost: f32) -> bool {
        if self.will_insert(cost) {
            self.heap.push(Cost(cost));
            if self.heap.len() > self.k {
                self.heap.pop();
            }
            true
        } else {
            false
        }
    }

    /// Predict what [`TopK::insert`] would return, without mutating.
    pub fn will_insert(&self, cost: f32) -> bool {
        self.heap.len() < self.k || self.heap.peek().is_some_and(|worst| cost < worst.0)
    }
}
