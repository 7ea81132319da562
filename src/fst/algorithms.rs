//! Construction-time automaton algorithms: determinization and
//! minimization.
//!
//! Both operate on [`VectorFst`] and are tailored to the automata this
//! crate builds: acceptors whose same-input arcs always agree on output
//! label and weight (the subword prefix tree satisfies this by
//! construction). Determinization is a plain subset construction under
//! that assumption; violating inputs are reported, not silently merged.

use super::{Arc, Fst, StateId, VectorFst};
use crate::error::{Error, Result};
use crate::symbol::Label;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};

/// Subset construction.
///
/// Merges states reachable by the same input string. Arcs that share an
/// input label within a subset must carry identical output labels and
/// weights; anything else means the automaton is not functional on its
/// input side and construction aborts.
pub fn determinize(fst: &VectorFst) -> Result<VectorFst> {
    let mut out = VectorFst::new(fst.input_symbols().clone(), fst.output_symbols().clone());
    let mut subset_ids: FxHashMap<Vec<StateId>, StateId> = FxHashMap::default();
    let mut queue: VecDeque<Vec<StateId>> = VecDeque::new();

    let start_subset = vec![fst.start()];
    let start = out.add_state();
    out.set_start(start);
    subset_ids.insert(start_subset.clone(), start);
    queue.push_back(start_subset);

    while let Some(subset) = queue.pop_front() {
        let subset_id = subset_ids[&subset];

        let final_weight = subset
            .iter()
            .map(|&s| fst.final_weight(s))
            .fold(f32::INFINITY, f32::min);
        out.set_final(subset_id, final_weight);

        // Group member arcs by input label, in label order for a
        // deterministic result.
        let mut groups: BTreeMap<Label, Vec<&Arc>> = BTreeMap::new();
        for &member in &subset {
            for arc in fst.arcs(member) {
                groups.entry(arc.ilabel).or_default().push(arc);
            }
        }

        for (ilabel, arcs) in groups {
            let first = arcs[0];
            if arcs
                .iter()
                .any(|a| a.olabel != first.olabel || a.weight.to_bits() != first.weight.to_bits())
            {
                return Err(Error::InvariantViolated(format!(
                    "conflicting outputs for input label {ilabel} during determinization"
                )));
            }

            let mut next_subset: Vec<StateId> = arcs.iter().map(|a| a.nextstate).collect();
            next_subset.sort_unstable();
            next_subset.dedup();

            let next_id = match subset_ids.get(&next_subset) {
                Some(&id) => id,
                None => {
                    let id = out.add_state();
                    subset_ids.insert(next_subset.clone(), id);
                    queue.push_back(next_subset);
                    id
                }
            };
            out.add_arc(
                subset_id,
                Arc::with_weight(ilabel, first.olabel, first.weight, next_id),
            );
        }
    }

    Ok(out)
}

type Signature = (u32, usize, Vec<(Label, Label, u32, usize)>);

/// Moore-style partition refinement.
///
/// Merges states with identical final weight and identical
/// `(ilabel, olabel, weight, destination-class)` arc sets, iterating to
/// a fixpoint. Expects every state to be reachable (true for anything
/// produced by [`determinize`]). Classes are numbered by first
/// appearance, so the result is deterministic.
pub fn minimize(fst: &VectorFst) -> VectorFst {
    let num_states = fst.num_states();
    let mut classes: Vec<usize> = (0..num_states)
        .map(|s| usize::from(fst.is_final(s)))
        .collect();

    loop {
        let mut next_ids: FxHashMap<Signature, usize> = FxHashMap::default();
        let mut next_classes = Vec::with_capacity(num_states);
        for state in 0..num_states {
            let mut arcs: Vec<(Label, Label, u32, usize)> = fst
                .arcs(state)
                .iter()
                .map(|a| (a.ilabel, a.olabel, a.weight.to_bits(), classes[a.nextstate]))
                .collect();
            arcs.sort_unstable();
            // the state's own class keeps refinement monotone: classes
            // only ever split, so the loop terminates
            let signature = (fst.final_weight(state).to_bits(), classes[state], arcs);
            let next = next_ids.len();
            let class = *next_ids.entry(signature).or_insert(next);
            next_classes.push(class);
        }
        let stable = next_classes == classes;
        classes = next_classes;
        if stable {
            break;
        }
    }

    // One representative per class, keeping the first-seen ordering so
    // the start state maps predictably.
    let num_classes = classes.iter().copied().max().map_or(0, |m| m + 1);
    let mut representative: Vec<Option<StateId>> = vec![None; num_classes];
    for state in 0..num_states {
        representative[classes[state]].get_or_insert(state);
    }

    let mut out = VectorFst::new(fst.input_symbols().clone(), fst.output_symbols().clone());
    for _ in 0..num_classes {
        out.add_state();
    }
    for (class, repr) in representative.iter().enumerate() {
        let repr = repr.expect("every class has a representative");
        out.set_final(class, fst.final_weight(repr));
        for arc in fst.arcs(repr) {
            out.add_arc(
                class,
                Arc::with_weight(arc.ilabel, arc.olabel, arc.weight, classes[arc.nextstate]),
            );
        }
    }
    out.set_start(classes[fst.start()]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn tables() -> (SymbolTable, SymbolTable) {
        (SymbolTable::with_reserved(), SymbolTable::with_reserved())
    }

    #[test]
    fn determinize_merges_shared_prefixes() {
        // Two paths consuming label 5 from the start, as token insertion
        // produces before determinization.
        let (isym, osym) = tables();
        let mut fst = VectorFst::new(isym, osym);
        let s0 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s0, 0.0);
        let a1 = fst.add_state();
        let a2 = fst.add_state();
        fst.add_arc(s0, Arc::new(5, 0, a1));
        fst.add_arc(s0, Arc::new(5, 0, a2));
        fst.add_arc(a1, Arc::new(6, 0, a1));
        fst.add_arc(a2, Arc::new(7, 0, a2));

        let det = determinize(&fst).unwrap();
        assert_eq!(det.num_arcs(det.start()), 1);
        let merged = det.arcs(det.start())[0].nextstate;
        let labels: Vec<_> = det.arcs(merged).iter().map(|a| a.ilabel).collect();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&6) && labels.contains(&7));
    }

    #[test]
    fn determinize_rejects_conflicting_outputs() {
        let (isym, osym) = tables();
        let mut fst = VectorFst::new(isym, osym);
        let s0 = fst.add_state();
        fst.set_start(s0);
        let a = fst.add_state();
        let b = fst.add_state();
        fst.add_arc(s0, Arc::new(5, 8, a));
        fst.add_arc(s0, Arc::new(5, 9, b));
        assert!(determinize(&fst).is_err());
    }

    #[test]
    fn minimize_merges_equivalent_suffixes() {
        // Two branches that both accept label 6 and stop.
        let (isym, osym) = tables();
        let mut fst = VectorFst::new(isym, osym);
        let s0 = fst.add_state();
        fst.set_start(s0);
        let a = fst.add_state();
        let b = fst.add_state();
        let fa = fst.add_state();
        let fb = fst.add_state();
        fst.set_final(fa, 0.0);
        fst.set_final(fb, 0.0);
        fst.add_arc(s0, Arc::new(5, 0, a));
        fst.add_arc(s0, Arc::new(7, 0, b));
        fst.add_arc(a, Arc::new(6, 0, fa));
        fst.add_arc(b, Arc::new(6, 0, fb));

        let min = minimize(&fst);
        // fa/fb merge, then a/b merge: 5 states -> 3.
        assert_eq!(min.num_states(), 3);
        assert_eq!(min.num_arcs(min.start()), 2);
    }

    #[test]
    fn minimize_respects_weights() {
        let (isym, osym) = tables();
        let mut fst = VectorFst::new(isym, osym);
        let s0 = fst.add_state();
        fst.set_start(s0);
        let a = fst.add_state();
        let b = fst.add_state();
        fst.set_final(a, 0.0);
        fst.set_final(b, 1.0);
        fst.add_arc(s0, Arc::new(5, 0, a));
        fst.add_arc(s0, Arc::new(6, 0, b));
        let min = minimize(&fst);
        assert_eq!(min.num_states(), 3);
    }
}
