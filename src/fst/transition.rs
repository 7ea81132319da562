//! Phi-transition primitives.
//!
//! These two functions are the runtime contract for traversing an
//! automaton whose non-matching inputs are delegated to failure arcs.
//! Together with [`PhiMatcher`](super::matcher::PhiMatcher) they are the
//! only code that interprets phi arcs.

use super::matcher::Matcher;
use super::{Fst, StateId};
use crate::error::{Error, Result};
use crate::symbol::{Label, EPSILON, PHI};
use smallvec::SmallVec;

/// Output-label buffer for transition walks.
///
/// Most walks emit at most a couple of labels; stack-allocate up to
/// eight to keep the hot path allocation-free.
pub type OlabelBuffer = SmallVec<[Label; 8]>;

/// Consume `ilabel` from `in_state`, following phi arcs until a direct
/// match is found.
///
/// Passing `ilabel == PHI` consumes a single phi step instead. Output
/// labels of every traversed non-epsilon arc are appended to `olabels`;
/// weights accumulate into the returned cost. After the match, forced
/// phi chains are drained: while the current state is non-final and its
/// only arc is a phi arc, that arc is taken too, so the next query
/// starts from a maximally backed-off state.
pub fn make_transitions<F: Fst, M: Matcher>(
    fst: &F,
    matcher: &mut M,
    in_state: StateId,
    ilabel: Label,
    olabels: &mut OlabelBuffer,
) -> Result<(StateId, f32)> {
    let mut state = in_state;
    let mut cost = 0.0f32;

    loop {
        matcher.set_state(state);
        let matched = matcher.find(ilabel);
        if !matched && !matcher.find(PHI) {
            return Err(Error::InvariantViolated(format!(
                "no viable transition found at state {state}"
            )));
        }
        let arc = *matcher.value();
        if arc.olabel != EPSILON {
            olabels.push(arc.olabel);
        }
        cost += arc.weight;
        state = arc.nextstate;
        if matched {
            break;
        }
    }

    // Drain unambiguous phi chains.
    while !fst.is_final(state) && fst.num_arcs(state) == 1 {
        matcher.set_state(state);
        if !matcher.find(PHI) {
            break;
        }
        let arc = *matcher.value();
        if arc.olabel != EPSILON {
            olabels.push(arc.olabel);
        }
        cost += arc.weight;
        state = arc.nextstate;
    }

    Ok((state, cost))
}

/// Follow phi arcs from `in_state` until a final state is reached,
/// appending traversed output labels and accumulating weights plus the
/// reached state's final weight. This is the total cost of exiting the
/// automaton from `in_state`.
pub fn make_exit_transitions<F: Fst, M: Matcher>(
    fst: &F,
    matcher: &mut M,
    in_state: StateId,
    olabels: &mut OlabelBuffer,
) -> Result<(StateId, f32)> {
    let mut state = in_state;
    let mut cost = 0.0f32;

    while !fst.is_final(state) {
        matcher.set_state(state);
        if !matcher.find(PHI) {
            return Err(Error::InvariantViolated(format!(
                "no phi transition toward a final state from state {state}"
            )));
        }
        let arc = *matcher.value();
        cost += arc.weight;
        if arc.olabel != EPSILON {
            olabels.push(arc.olabel);
        }
        state = arc.nextstate;
    }

    cost += fst.final_weight(state);
    Ok((state, cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::matcher::UnsortedMatcher;
    use crate::fst::{Arc, VectorFst};
    use crate::symbol::SymbolTable;

    /// start --5/eps--> s1 --phi/8--> start (final).
    /// s1 also accepts 6 directly into a state with a forced phi chain.
    fn chain_fst() -> VectorFst {
        let mut fst =
            VectorFst::new(SymbolTable::with_reserved(), SymbolTable::with_reserved());
        let start = fst.add_state();
        let s1 = fst.add_state();
        let s2 = fst.add_state();
        let s3 = fst.add_state();
        fst.set_start(start);
        fst.set_final(start, 0.0);
        fst.add_arc(start, Arc::new(5, EPSILON, s1));
        fst.add_arc(s1, Arc::with_weight(PHI, 8, 0.5, start));
        fst.add_arc(s1, Arc::new(6, EPSILON, s2));
        // s2's only arc is phi: drained automatically after a match.
        fst.add_arc(s2, Arc::with_weight(PHI, 9, 0.25, s3));
        fst.add_arc(s3, Arc::with_weight(PHI, 10, 0.25, start));
        fst.add_arc(s3, Arc::new(7, EPSILON, s1));
        fst
    }

    #[test]
    fn direct_match_no_emission() {
        let fst = chain_fst();
        let mut matcher = UnsortedMatcher::new(&fst);
        let mut olabels = OlabelBuffer::new();
        let (state, cost) = make_transitions(&fst, &mut matcher, 0, 5, &mut olabels).unwrap();
        assert_eq!(state, 1);
        assert!(olabels.is_empty());
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn failed_match_follows_phi_and_emits() {
        let fst = chain_fst();
        let mut matcher = UnsortedMatcher::new(&fst);
        let mut olabels = OlabelBuffer::new();
        // 5 is absent at s1: phi emits 8 back to start, then 5 matches.
        let (state, cost) = make_transitions(&fst, &mut matcher, 1, 5, &mut olabels).unwrap();
        assert_eq!(state, 1);
        assert_eq!(olabels.as_slice(), [8]);
        assert_eq!(cost, 0.5);
    }

    #[test]
    fn forced_phi_chain_is_drained() {
        let fst = chain_fst();
        let mut matcher = UnsortedMatcher::new(&fst);
        let mut olabels = OlabelBuffer::new();
        // 6 matches into s2 whose single phi arc leads to s3 (two arcs,
        // so draining stops there).
        let (state, _) = make_transitions(&fst, &mut matcher, 1, 6, &mut olabels).unwrap();
        assert_eq!(state, 3);
        assert_eq!(olabels.as_slice(), [9]);
    }

    #[test]
    fn explicit_phi_takes_one_step() {
        let fst = chain_fst();
        let mut matcher = UnsortedMatcher::new(&fst);
        let mut olabels = OlabelBuffer::new();
        let (state, _) = make_transitions(&fst, &mut matcher, 1, PHI, &mut olabels).unwrap();
        assert_eq!(state, 0);
        assert_eq!(olabels.as_slice(), [8]);
    }

    #[test]
    fn missing_phi_is_an_error() {
        let mut fst =
            VectorFst::new(SymbolTable::with_reserved(), SymbolTable::with_reserved());
        let start = fst.add_state();
        fst.set_start(start);
        let mut matcher = UnsortedMatcher::new(&fst);
        let mut olabels = OlabelBuffer::new();
        assert!(make_transitions(&fst, &mut matcher, 0, 5, &mut olabels).is_err());
    }

    #[test]
    fn exit_transitions_accumulate_to_final() {
        let fst = chain_fst();
        let mut matcher = UnsortedMatcher::new(&fst);
        let mut olabels = OlabelBuffer::new();
        let (state, cost) = make_exit_transitions(&fst, &mut matcher, 2, &mut olabels).unwrap();
        assert_eq!(state, 0);
        assert_eq!(olabels.as_slice(), [9, 10]);
        assert_eq!(cost, 0.5);
    }

    #[test]
    fn exit_from_final_state_costs_final_weight() {
        let fst = chain_fst();
        let mut matcher = UnsortedMatcher::new(&fst);
        let mut olabels = OlabelBuffer::new();
        let (state, cost) = make_exit_transitions(&fst, &mut matcher, 0, &mut olabels).unwrap();
        assert_eq!(state, 0);
        assert_eq!(cost, 0.0);
        assert!(olabels.is_empty());
    }
}
