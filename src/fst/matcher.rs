//! Arc matchers: positioned lookup of an input label at a state.
//!
//! A matcher holds a current state and answers "is there an arc with
//! this input label here". Construction-time code uses the linear-scan
//! variant because arcs are still being added in arbitrary order; query
//! paths use the binary-search variant over input-sorted arcs. The phi
//! matcher wraps the sorted variant and resolves a label through the
//! failure chain, folding the traversed back-off weights into the arc it
//! reports.
//!
//! Matchers carry per-instance scratch state and must not be shared
//! across concurrent queries; they are cheap to construct on demand.

use super::{Arc, Fst, StateId};
use crate::symbol::{Label, PHI};

/// Positioned arc lookup.
pub trait Matcher {
    /// Position the matcher at `state`.
    fn set_state(&mut self, state: StateId);

    /// Search for an arc with input label `label` from the current
    /// state. On success the arc is available through [`Matcher::value`].
    fn find(&mut self, label: Label) -> bool;

    /// The arc found by the last successful [`Matcher::find`].
    fn value(&self) -> &Arc;
}

/// Linear-scan matcher for automata whose arcs are not sorted yet.
pub struct UnsortedMatcher<'f, F: Fst> {
    fst: &'f F,
    state: StateId,
    arc: Arc,
}

impl<'f, F: Fst> UnsortedMatcher<'f, F> {
    /// Create a matcher positioned at the start state.
    pub fn new(fst: &'f F) -> Self {
        Self { fst, state: fst.start(), arc: Arc::new(0, 0, 0) }
    }
}

impl<F: Fst> Matcher for UnsortedMatcher<'_, F> {
    fn set_state(&mut self, state: StateId) {
        self.state = state;
    }

    fn find(&mut self, label: Label) -> bool {
        match self.fst.arcs(self.state).iter().find(|arc| arc.ilabel == label) {
            Some(arc) => {
                self.arc = *arc;
                true
            }
            None => false,
        }
    }

    fn value(&self) -> &Arc {
        &self.arc
    }
}

/// Binary-search matcher over input-label-sorted arcs.
pub struct SortedMatcher<'f, F: Fst> {
    fst: &'f F,
    state: StateId,
    arc: Arc,
}

impl<'f, F: Fst> SortedMatcher<'f, F> {
    /// Create a matcher positioned at the start state.
    pub fn new(fst: &'f F) -> Self {
        Self { fst, state: fst.start(), arc: Arc::new(0, 0, 0) }
    }
}

impl<F: Fst> Matcher for SortedMatcher<'_, F> {
    fn set_state(&mut self, state: StateId) {
        self.state = state;
    }

    fn find(&mut self, label: Label) -> bool {
        let arcs = self.fst.arcs(self.state);
        match arcs.binary_search_by_key(&label, |arc| arc.ilabel) {
            Ok(pos) => {
                self.arc = arcs[pos];
                true
            }
            Err(_) => false,
        }
    }

    fn value(&self) -> &Arc {
        &self.arc
    }
}

/// Matcher that resolves labels through phi back-off arcs.
///
/// `find(label)` walks the failure chain from the positioned state until
/// a state with a direct match is reached. The reported arc carries the
/// sum of the traversed phi weights and the matched arc's weight, and
/// the matched arc's destination; the positioned state is untouched, so
/// repeated `find` calls are independent.
///
/// The phi closure of any state is acyclic (back-off strictly shortens
/// context), so the walk terminates.
pub struct PhiMatcher<'f, F: Fst> {
    inner: SortedMatcher<'f, F>,
    state: StateId,
    arc: Arc,
}

impl<'f, F: Fst> PhiMatcher<'f, F> {
    /// Create a phi matcher positioned at the start state.
    pub fn new(fst: &'f F) -> Self {
        Self { inner: SortedMatcher::new(fst), state: fst.start(), arc: Arc::new(0, 0, 0) }
    }
}

impl<F: Fst> Matcher for PhiMatcher<'_, F> {
    fn set_state(&mut self, state: StateId) {
        self.state = state;
    }

    fn find(&mut self, label: Label) -> bool {
        let mut state = self.state;
        let mut backoff = 0.0f32;
        loop {
            self.inner.set_state(state);
            if self.inner.find(label) {
                let matched = *self.inner.value();
                self.arc = Arc::with_weight(
                    matched.ilabel,
                    matched.olabel,
                    matched.weight + backoff,
                    matched.nextstate,
                );
                return true;
            }
            if label != PHI && self.inner.find(PHI) {
                let phi = *self.inner.value();
                backoff += phi.weight;
                state = phi.nextstate;
            } else {
                return false;
            }
        }
    }

    fn value(&self) -> &Arc {
        &self.arc
    }
}
