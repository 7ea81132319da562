//! Language-model-driven query completion.
//!
//! [`QueryBlazer`] couples the LPM encoder with an n-gram language model
//! automaton. Completing a prefix encodes its stable part, advances the
//! model to the matching context, seeds beams from every tokenization
//! the unstable tail could still take, and merges those seeds with the
//! per-state beam-search results (computed lazily, or in bulk up front
//! when [`Config::precompute`] is set).

mod beam;
mod precompute;

pub use beam::TopResult;

use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::fst::matcher::{Matcher, PhiMatcher};
use crate::fst::transition::{make_exit_transitions, OlabelBuffer};
use crate::fst::{Arc, ConstFst, Fst, StateId};
use crate::symbol::{Label, UNK};
use crate::text::{sentinel_to_spaces, spaces_to_sentinel};
use crate::topk::TopK;
use beam::Beam;
use std::sync::OnceLock;

/// Completion engine parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-state fan-out cap when expanding beams over the model.
    pub branch_factor: usize,
    /// Maximum number of live beams per expansion round.
    pub beam_size: usize,
    /// Number of completions returned per query.
    pub topk: usize,
    /// Maximum emitted-token length of a completion.
    pub length_limit: usize,
    /// Precompute beam-search results for every model state up front.
    pub precompute: bool,
    /// Log beam-search diagnostics to stderr.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branch_factor: 30,
            beam_size: 30,
            topk: 10,
            length_limit: 100,
            precompute: false,
            verbose: false,
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.branch_factor < 1 {
            return Err(Error::Config("branch factor must be positive".into()));
        }
        if self.beam_size < 1 {
            return Err(Error::Config("beam size must be positive".into()));
        }
        if self.topk < 1 {
            return Err(Error::Config("top k must be positive".into()));
        }
        if self.beam_size < self.topk {
            return Err(Error::Config("beam size must be at least top k".into()));
        }
        Ok(())
    }
}

/// The query completion engine.
///
/// Immutable after construction; `complete` builds its matchers per
/// call, so a shared reference can serve queries from multiple threads.
pub struct QueryBlazer {
    encoder: Encoder,
    model: ConstFst,
    config: Config,
    /// Per encoder state: every olabel sequence the in-progress suffix
    /// could still tokenize into, shortest first.
    encoder_candidates: Vec<Vec<Vec<Label>>>,
    /// Per model state: best emitting arcs through phi back-off. Freed
    /// once every state's beam-search result is cached.
    top_arcs: Vec<OnceLock<Vec<Arc>>>,
    /// Per model state: cached beam-search completions.
    top_results: Vec<OnceLock<TopResult>>,
}

impl QueryBlazer {
    /// Assemble the engine from a loaded encoder and language model.
    ///
    /// Fails if the encoder's output alphabet differs from the model's
    /// input alphabet (by labeled checksum), and precomputes per-state
    /// results when the config requests it.
    pub fn new(encoder: ConstFst, model: ConstFst, config: Config) -> Result<Self> {
        config.validate()?;

        if encoder.output_symbols().labeled_checksum() != model.input_symbols().labeled_checksum()
        {
            return Err(Error::Format(
                "encoder output symbols do not match model input symbols".into(),
            ));
        }

        let available = model.input_symbols().available_key() as usize;
        for state in 0..model.num_states() {
            if let Some(arc) = model.arcs(state).iter().find(|a| a.ilabel as usize >= available) {
                return Err(Error::Format(format!(
                    "model arc label {} out of symbol-table range", arc.ilabel
                )));
            }
        }

        let encoder = Encoder::new(encoder)?;
        let encoder_candidates = Self::compute_encoder_candidates(&encoder)?;

        let num_states = model.num_states();
        let mut blazer = Self {
            encoder,
            model,
            config,
            encoder_candidates,
            top_arcs: (0..num_states).map(|_| OnceLock::new()).collect(),
            top_results: (0..num_states).map(|_| OnceLock::new()).collect(),
        };

        if blazer.config.precompute {
            blazer.precompute_all()?;
            // Every state's result is cached; the top-arcs working set
            // is no longer needed.
            blazer.top_arcs = Vec::new();
        }

        Ok(blazer)
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Candidate tokenizations of the unstable suffix, for every encoder
    /// state. A state whose only exit emits nothing gets the single
    /// empty sequence so it still seeds one beam.
    fn compute_encoder_candidates(encoder: &Encoder) -> Result<Vec<Vec<Vec<Label>>>> {
        let fst = encoder.fst();
        let mut candidates = Vec::with_capacity(fst.num_states());
        for state in 0..fst.num_states() {
            let mut sequences = encoder.candidate_olabels(state)?;
            if sequences.is_empty() {
                let mut olabels = OlabelBuffer::new();
                let mut matcher = crate::fst::matcher::SortedMatcher::new(fst);
                let (out_state, _) =
                    make_exit_transitions(fst, &mut matcher, state, &mut olabels)?;
                if out_state != fst.start() || !olabels.is_empty() {
                    return Err(Error::InvariantViolated(format!(
                        "empty candidate set at unexpected encoder state {state}"
                    )));
                }
                sequences.push(Vec::new());
            }
            candidates.push(sequences);
        }
        Ok(candidates)
    }

    /// Complete `query`, returning at most `topk` `(text, cost)` pairs
    /// ranked by cost ascending, plus the maximum decode length observed
    /// in the merged beam-search results.
    pub fn complete(&self, query: &str) -> Result<(Vec<(String, f32)>, usize)> {
        let prefix = spaces_to_sentinel(query);
        let (ilabels, oovs) = self.encoder.map_ilabels(&prefix);

        // Stable token prefix: part of the input that can no longer
        // change with more typing.
        let (stable, encoder_state) = self.encoder.encode(&ilabels, false)?;
        let mut stable_prefix = String::new();
        let mut oov_idx = 0;
        for &id in &stable {
            if id == UNK {
                stable_prefix.push(oovs[oov_idx]);
                oov_idx += 1;
            } else {
                stable_prefix.push_str(self.encoder.output_symbols().name(id).ok_or_else(
                    || Error::InvariantViolated(format!("unknown output label {id}")),
                )?);
            }
        }
        if oov_idx != oovs.len() {
            return Err(Error::InvariantViolated("oov buffer size mismatch".into()));
        }

        // Advance the model through the stable tokens.
        let mut model_state = self.model.start();
        let mut init_cost = 0.0f32;
        let mut phi_matcher = PhiMatcher::new(&self.model);
        for &id in &stable {
            phi_matcher.set_state(model_state);
            if !phi_matcher.find(id) && !phi_matcher.find(UNK) {
                return Err(Error::RuntimeInvariant("<unk> token not found in model".into()));
            }
            init_cost += phi_matcher.value().weight;
            model_state = phi_matcher.value().nextstate;
        }

        // Merge each seed beam with its state's precomputed results,
        // best seeds first, stopping as soon as top-k cannot improve.
        let beams = self.init_beams(encoder_state, model_state)?;
        let mut results: Vec<(Vec<Label>, f32)> = Vec::new();
        let mut max_decode_length = 0usize;
        let mut topk = TopK::new(self.config.topk)?;

        for (olabels, beam) in &beams {
            if !topk.will_insert(beam.cost) {
                break;
            }
            let top = self.get_top_result(beam.state)?;
            for (precomputed, cost) in &top.completions {
                let cost = beam.cost + cost;
                if !topk.insert(cost) {
                    break;
                }
                let mut sequence = olabels.clone();
                sequence.extend_from_slice(precomputed);
                results.push((sequence, cost));
            }
            max_decode_length = max_decode_length.max(top.max_decode_length);
        }

        if results.len() < self.config.topk {
            return Err(Error::RuntimeInvariant(format!(
                "only {} completions available for top {}",
                results.len(),
                self.config.topk
            )));
        }
        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        results.truncate(self.config.topk);

        let mut suggestions = Vec::with_capacity(results.len());
        for (olabels, cost) in results {
            let mut output = stable_prefix.clone();
            for &id in &olabels {
                if id == UNK {
                    continue;
                }
                output.push_str(self.model.output_symbols().name(id).ok_or_else(|| {
                    Error::InvariantViolated(format!("unknown output label {id}"))
                })?);
            }
            suggestions.push((sentinel_to_spaces(&output), init_cost + cost));
        }

        Ok((suggestions, max_decode_length))
    }

    /// Walk every candidate tokenization of the unstable suffix through
    /// the model and keep the `beam_size` cheapest as seed beams, cost
    /// ascending.
    fn init_beams(
        &self,
        encoder_state: StateId,
        model_state: StateId,
    ) -> Result<Vec<(Vec<Label>, Beam)>> {
        let sequences = &self.encoder_candidates[encoder_state];
        let mut topk = TopK::new(self.config.beam_size)?;
        let mut beams: Vec<(Vec<Label>, Beam)> = Vec::new();
        let mut phi_matcher = PhiMatcher::new(&self.model);

        'sequences: for sequence in sequences {
            let mut score = 0.0f32;
            let mut state = model_state;
            let mut olabels = Vec::with_capacity(sequence.len());
            for &ilabel in sequence {
                phi_matcher.set_state(state);
                if !phi_matcher.find(ilabel) && !phi_matcher.find(UNK) {
                    // the token's unigram may have been pruned from the
                    // model, but <unk> must exist
                    return Err(Error::RuntimeInvariant(
                        "<unk> token not found in model".into(),
                    ));
                }
                score += phi_matcher.value().weight;
                if !topk.will_insert(score) {
                    continue 'sequences;
                }
                state = phi_matcher.value().nextstate;
                olabels.push(ilabel);
            }
            beams.push((olabels, Beam { state, cost: score }));
            topk.insert(score);
        }

        beams.sort_by(|a, b| a.1.cost.total_cmp(&b.1.cost));
        beams.truncate(self.config.beam_size);
        Ok(beams)
    }
}
