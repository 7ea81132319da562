//! Applying the LPM encoder automaton at query time.

use crate::error::{Error, Result};
use crate::fst::matcher::{Matcher, SortedMatcher};
use crate::fst::transition::{make_exit_transitions, make_transitions, OlabelBuffer};
use crate::fst::{ConstFst, Fst, StateId};
use crate::symbol::{Label, SymbolTable, EPSILON, SPACE, UNK};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// The encoder automaton plus its designated *begin* state.
///
/// Queries are implicitly prefixed with a word boundary, so encoding
/// starts from the state reached from start by consuming the `▁`
/// sentinel rather than from the start state itself.
pub struct Encoder {
    fst: ConstFst,
    begin_state: StateId,
}

impl Encoder {
    /// Wrap a loaded encoder automaton, locating the begin state.
    pub fn new(fst: ConstFst) -> Result<Self> {
        fst.input_symbols().check_reserved()?;
        fst.output_symbols().check_reserved()?;

        let mut buffer = [0u8; 4];
        let space = fst
            .input_symbols()
            .find(SPACE.encode_utf8(&mut buffer))
            .ok_or_else(|| Error::Format("space sentinel missing from encoder alphabet".into()))?;
        let mut matcher = SortedMatcher::new(&fst);
        matcher.set_state(fst.start());
        if !matcher.find(space) {
            return Err(Error::Format("encoder begin state not found".into()));
        }
        let begin_state = matcher.value().nextstate;
        drop(matcher);

        Ok(Self { fst, begin_state })
    }

    /// The underlying automaton.
    pub fn fst(&self) -> &ConstFst {
        &self.fst
    }

    /// State reached from start by the `▁` sentinel.
    pub fn begin_state(&self) -> StateId {
        self.begin_state
    }

    /// The output symbol table (subword tokens).
    pub fn output_symbols(&self) -> &SymbolTable {
        self.fst.output_symbols()
    }

    /// Map code points to encoder input labels. Unknown code points map
    /// to `UNK` and are recorded in order in the returned OOV buffer.
    pub fn map_ilabels(&self, text: &str) -> (Vec<Label>, Vec<char>) {
        let mut ilabels = Vec::with_capacity(text.chars().count());
        let mut oovs = Vec::new();
        let mut buffer = [0u8; 4];
        for c in text.chars() {
            match self.fst.input_symbols().find(c.encode_utf8(&mut buffer)) {
                Some(label) => ilabels.push(label),
                None => {
                    oovs.push(c);
                    ilabels.push(UNK);
                }
            }
        }
        (ilabels, oovs)
    }

    /// Transduce input labels into the longest-prefix-match token
    /// sequence, starting from the begin state.
    ///
    /// An `UNK` input first flushes any in-progress subword via exit
    /// transitions, emits `UNK`, and resumes from the start state. With
    /// `complete` set, a final exit flushes the remaining suffix too;
    /// otherwise the returned state marks where encoding stopped, for
    /// candidate enumeration over the unstable tail.
    pub fn encode(&self, ilabels: &[Label], complete: bool) -> Result<(Vec<Label>, StateId)> {
        self.encode_from(self.begin_state, ilabels, complete)
    }

    /// [`Encoder::encode`] from an explicit state.
    pub fn encode_from(
        &self,
        in_state: StateId,
        ilabels: &[Label],
        complete: bool,
    ) -> Result<(Vec<Label>, StateId)> {
        let mut olabels = OlabelBuffer::new();
        let mut state = in_state;
        let mut matcher = SortedMatcher::new(&self.fst);

        for &ilabel in ilabels {
            if ilabel < UNK {
                return Err(Error::Format(format!("unexpected input label: {ilabel}")));
            }
            if ilabel == UNK {
                let (out, _) = make_exit_transitions(&self.fst, &mut matcher, state, &mut olabels)?;
                state = out;
                olabels.push(UNK);
            } else {
                let (out, _) = make_transitions(&self.fst, &mut matcher, state, ilabel, &mut olabels)?;
                state = out;
            }
        }

        if complete {
            let (out, _) = make_exit_transitions(&self.fst, &mut matcher, state, &mut olabels)?;
            state = out;
        }

        Ok((olabels.into_vec(), state))
    }

    /// Enumerate every distinct output-label sequence that reaches the
    /// start state from `state` under any walk.
    ///
    /// Among sequences spelling the same text, only the shortest (fewest
    /// tokens) is kept; two distinct sequences of equal length spelling
    /// the same text would make the tokenization ambiguous and are an
    /// error. Results are sorted by length, shortest first. The walk
    /// terminates because every emitted-text prefix is recorded before
    /// longer spellings of it are expanded, which requires the
    /// vocabulary to cover single characters.
    pub fn candidate_olabels(&self, state: StateId) -> Result<Vec<Vec<Label>>> {
        let start = self.fst.start();
        let mut sequences: BTreeSet<Vec<Label>> = BTreeSet::new();
        let mut queue: VecDeque<(Vec<Label>, StateId)> = VecDeque::from([(Vec::new(), state)]);

        while let Some((olabels, visit)) = queue.pop_front() {
            if visit == start {
                if !olabels.is_empty() {
                    sequences.insert(olabels);
                }
            } else if !sequences.contains(&olabels) {
                for arc in self.fst.arcs(visit) {
                    let mut extended = olabels.clone();
                    if arc.olabel != EPSILON {
                        extended.push(arc.olabel);
                    }
                    queue.push_back((extended, arc.nextstate));
                }
            }
        }

        // Keep the shortest spelling of each distinct text.
        let mut by_text: BTreeMap<String, Vec<Label>> = BTreeMap::new();
        for sequence in sequences {
            let mut text = String::new();
            for &olabel in &sequence {
                let token = self.fst.output_symbols().name(olabel).ok_or_else(|| {
                    Error::InvariantViolated(format!("output label {olabel} missing from table"))
                })?;
                text.push_str(token);
            }
            match by_text.entry(text) {
                Entry::Vacant(slot) => {
                    slot.insert(sequence);
                }
                Entry::Occupied(mut slot) => {
                    let best_len = slot.get().len();
                    if sequence.len() < best_len {
                        slot.insert(sequence);
                    } else if sequence.len() == best_len {
                        return Err(Error::InvariantViolated(format!(
                            "ambiguous tokenization for {:?}",
                            slot.key()
                        )));
                    }
                }
            }
        }

        let mut result: Vec<Vec<Label>> = by_text.into_values().collect();
        result.sort_by_key(Vec::len);
        Ok(result)
    }
}
