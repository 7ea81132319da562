//! Beam search over the language-model automaton.

use super::QueryBlazer;
use crate::error::{Error, Result};
use crate::fst::matcher::SortedMatcher;
use crate::fst::transition::{make_exit_transitions, OlabelBuffer};
use crate::fst::{Arc, Fst, StateId};
use crate::prefix_tree::PrefixTree;
use crate::symbol::{Label, EPSILON, PHI};
use crate::topk::TopK;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A live hypothesis: the model state reached and the cost paid so far.
/// The emitted labels live in the frontier tree's root-to-leaf path.
#[derive(Debug, Clone, Copy)]
pub(super) struct Beam {
    pub state: StateId,
    pub cost: f32,
}

/// Beam-search output for one model state: the top completions as
/// `(olabel sequence, cost)` pairs, cost ascending, and the longest
/// decode observed while producing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopResult {
    /// Completions, best first.
    pub completions: Vec<(Vec<Label>, f32)>,
    /// Maximum emitted-token length explored.
    pub max_decode_length: usize,
}

impl QueryBlazer {
    /// The `branch_factor` best emitting arcs leaving `state`, following
    /// phi back-off as far as it can still compete.
    ///
    /// Results are cached per state; the cache slot is written at most
    /// once, so parallel precomputation needs no further coordination.
    pub(super) fn get_top_arcs(&self, state: StateId) -> Result<Vec<Arc>> {
        match self.top_arcs.get(state) {
            Some(slot) => {
                if let Some(arcs) = slot.get() {
                    return Ok(arcs.clone());
                }
                let computed = self.compute_top_arcs(state)?;
                Ok(slot.get_or_init(|| computed).clone())
            }
            // cache already freed after precomputation
            None => self.compute_top_arcs(state),
        }
    }

    /// Phi-closure expansion of the emitting fan-out at `state`.
    ///
    /// Pops back-off states breadth-first, collecting each input label's
    /// cheapest (fewest-phi) arc with the accumulated back-off cost
    /// folded into its weight. Expansion stops once the pending phi arc
    /// ranks at or beyond `branch_factor`: deeper back-off can only cost
    /// more, so it is dominated. Relies on the model's unigram layer
    /// emitting every token; see the crate documentation.
    fn compute_top_arcs(&self, state: StateId) -> Result<Vec<Arc>> {
        let branch_factor = self.config.branch_factor;
        let mut arcs: Vec<Arc> = Vec::new();
        let mut seen = vec![false; self.model.input_symbols().available_key() as usize];
        let mut queue: VecDeque<(StateId, f32)> = VecDeque::from([(state, 0.0)]);

        while let Some((backoff_state, backoff_cost)) = queue.pop_front() {
            for arc in self.model.arcs(backoff_state) {
                let mut arc = *arc;
                if arc.ilabel == PHI {
                    queue.push_back((arc.nextstate, backoff_cost + arc.weight));
                } else if !seen[arc.ilabel as usize] {
                    seen[arc.ilabel as usize] = true;
                } else {
                    // a fewer-phi arc for this label already exists
                    continue;
                }
                arc.weight += backoff_cost;
                arcs.push(arc);
            }

            if arcs.len() > branch_factor {
                arcs.sort_by(|a, b| a.weight.total_cmp(&b.weight));
            }

            // Once the phi arc (or its absence) ranks at or beyond the
            // branch factor, deeper back-off is dominated.
            let phi_pos = arcs.iter().position(|a| a.ilabel == PHI);
            if arcs.len() > branch_factor && phi_pos.unwrap_or(arcs.len()) >= branch_factor {
                arcs.truncate(branch_factor);
                if arcs.iter().any(|a| a.olabel == EPSILON) {
                    return Err(Error::InvariantViolated(
                        "non-emitting transition within top arcs".into(),
                    ));
                }
                return Ok(arcs);
            }
            match phi_pos {
                Some(pos) => {
                    arcs.swap_remove(pos);
                }
                None => {
                    return Err(Error::RuntimeInvariant(format!(
                        "phi transition not found expanding top arcs of state {state}"
                    )))
                }
            }
        }

        Err(Error::RuntimeInvariant(format!(
            "top-arc expansion of state {state} exhausted below the branch factor"
        )))
    }

    /// Beam-search completions for `state`, cached on first use.
    pub(super) fn get_top_result(&self, state: StateId) -> Result<&TopResult> {
        if let Some(result) = self.top_results[state].get() {
            return Ok(result);
        }
        let mut frontier: PrefixTree<Label, Beam> = PrefixTree::new();
        frontier.insert(&[], Beam { state, cost: 0.0 });
        let computed = self.beam_search(&mut frontier)?;
        Ok(self.top_results[state].get_or_init(|| computed))
    }

    /// Frontier-pruned best-first enumeration.
    ///
    /// Each round gathers the live beams, keeps the `beam_size` cheapest
    /// and, for each in cost order: records finishing here (exit cost)
    /// when competitive, then extends it along its state's top arcs.
    /// Every gathered beam is erased afterwards, so the loop ends when
    /// the frontier empties.
    pub(super) fn beam_search(&self, frontier: &mut PrefixTree<Label, Beam>) -> Result<TopResult> {
        let mut completions: Vec<(Vec<Label>, f32)> = Vec::new();
        let mut topk = TopK::new(self.config.topk)?;
        let mut max_decode_length = 0usize;
        let mut matcher = SortedMatcher::new(&self.model);
        let mut scratch = OlabelBuffer::new();

        while !frontier.is_empty() {
            let mut leaves = frontier.find_all(&[]);
            leaves.sort_by(|&a, &b| {
                let ca = frontier.data(a).expect("gathered node is a leaf").cost;
                let cb = frontier.data(b).expect("gathered node is a leaf").cost;
                ca.total_cmp(&cb)
            });

            for &leaf in leaves.iter().take(self.config.beam_size) {
                let beam = *frontier.data(leaf).expect("gathered node is a leaf");
                if !topk.will_insert(beam.cost) {
                    // sorted ascending: the rest cannot compete either
                    break;
                }

                let depth = frontier.depth(leaf);
                max_decode_length = max_decode_length.max(depth);
                if depth >= self.config.length_limit {
                    if self.config.verbose {
                        eprintln!("beam length limit exceeded; abandoning beam");
                    }
                    continue;
                }

                scratch.clear();
                let (_, exit_cost) =
                    make_exit_transitions(&self.model, &mut matcher, beam.state, &mut scratch)?;
                let final_cost = exit_cost + beam.cost;
                if topk.insert(final_cost) {
                    completions.push((frontier.prefix(leaf), final_cost));
                }

                for arc in self.get_top_arcs(beam.state)? {
                    let cost = beam.cost + arc.weight;
                    if !topk.will_insert(cost) {
                        continue;
                    }
                    frontier.insert_at(leaf, &[arc.olabel], Beam { state: arc.nextstate, cost });
                }
            }

            for &leaf in &leaves {
                frontier.erase(leaf);
            }
        }

        completions.sort_by(|a, b| a.1.total_cmp(&b.1));
        completions.truncate(self.config.topk);
        Ok(TopResult { completions, max_decode_length })
    }
}
