//! Weighted finite-state automata over the tropical semiring.
//!
//! Two physical representations share one read-side trait: [`VectorFst`]
//! supports adding states and arcs and is used during construction;
//! [`ConstFst`] stores all arcs in a single flat vector for compact,
//! cache-friendly traversal at query time. States are dense `usize` ids;
//! arcs reference their destination by id, so graphs with cycles need no
//! pointer ownership.
//!
//! Weights are `f32` negative log-probabilities: they add along a path
//! and compete by minimum across paths. A non-final state carries an
//! infinite final weight.

pub mod algorithms;
pub mod matcher;
pub mod transition;

use crate::error::{Error, Result};
use crate::symbol::{Label, SymbolTable};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Index of a state within an automaton.
pub type StateId = usize;

/// A weighted, labeled transition between two states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    /// Input label consumed by this transition.
    pub ilabel: Label,
    /// Output label emitted by this transition.
    pub olabel: Label,
    /// Tropical weight (negative log-probability).
    pub weight: f32,
    /// Destination state.
    pub nextstate: StateId,
}

impl Arc {
    /// Convenience constructor for a zero-weight arc.
    pub fn new(ilabel: Label, olabel: Label, nextstate: StateId) -> Self {
        Self { ilabel, olabel, weight: 0.0, nextstate }
    }

    /// Constructor carrying an explicit weight.
    pub fn with_weight(ilabel: Label, olabel: Label, weight: f32, nextstate: StateId) -> Self {
        Self { ilabel, olabel, weight, nextstate }
    }
}

/// Read-side view shared by both automaton representations.
pub trait Fst {
    /// The designated start state.
    fn start(&self) -> StateId;

    /// Final weight of `state`; infinite when the state is non-final.
    fn final_weight(&self, state: StateId) -> f32;

    /// Arcs leaving `state`, in storage order.
    fn arcs(&self, state: StateId) -> &[Arc];

    /// Number of arcs leaving `state`.
    fn num_arcs(&self, state: StateId) -> usize {
        self.arcs(state).len()
    }

    /// Total number of states.
    fn num_states(&self) -> usize;

    /// Input symbol table.
    fn input_symbols(&self) -> &SymbolTable;

    /// Output symbol table.
    fn output_symbols(&self) -> &SymbolTable;

    /// Whether `state` is final.
    fn is_final(&self, state: StateId) -> bool {
        self.final_weight(state).is_finite()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VectorState {
    arcs: Vec<Arc>,
    final_weight: f32,
}

impl VectorState {
    fn new() -> Self {
        Self { arcs: Vec::new(), final_weight: f32::INFINITY }
    }
}

/// Mutable automaton used during construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorFst {
    states: Vec<VectorState>,
    start: StateId,
    isymbols: SymbolTable,
    osymbols: SymbolTable,
}

impl VectorFst {
    /// Create an empty automaton with the given symbol tables.
    pub fn new(isymbols: SymbolTable, osymbols: SymbolTable) -> Self {
        Self { states: Vec::new(), start: 0, isymbols, osymbols }
    }

    /// Append a fresh non-final state and return its id.
    pub fn add_state(&mut self) -> StateId {
        self.states.push(VectorState::new());
        self.states.len() - 1
    }

    /// Add an arc leaving `state`.
    pub fn add_arc(&mut self, state: StateId, arc: Arc) {
        self.states[state].arcs.push(arc);
    }

    /// Designate the start state.
    pub fn set_start(&mut self, state: StateId) {
        self.start = state;
    }

    /// Set the final weight of `state`. Zero marks an unweighted final
    /// state; infinity reverts it to non-final.
    pub fn set_final(&mut self, state: StateId, weight: f32) {
        self.states[state].final_weight = weight;
    }

    /// Sort every state's arcs by input label (stable).
    pub fn arc_sort_ilabel(&mut self) {
        for state in &mut self.states {
            state.arcs.sort_by_key(|arc| arc.ilabel);
        }
    }
}

impl Fst for VectorFst {
    fn start(&self) -> StateId {
        self.start
    }

    fn final_weight(&self, state: StateId) -> f32 {
        self.states[state].final_weight
    }

    fn arcs(&self, state: StateId) -> &[Arc] {
        &self.states[state].arcs
    }

    fn num_states(&self) -> usize {
        self.states.len()
    }

    fn input_symbols(&self) -> &SymbolTable {
        &self.isymbols
    }

    fn output_symbols(&self) -> &SymbolTable {
        &self.osymbols
    }
}

/// Immutable automaton with flat arc storage, used at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstFst {
    /// All arcs, grouped by source state.
    arcs: Vec<Arc>,
    /// Per-state offsets into `arcs`; length `num_states + 1`.
    offsets: Vec<u32>,
    final_weights: Vec<f32>,
    start: StateId,
    isymbols: SymbolTable,
    osymbols: SymbolTable,
}

impl From<&VectorFst> for ConstFst {
    fn from(fst: &VectorFst) -> Self {
        let mut arcs = Vec::with_capacity(fst.states.iter().map(|s| s.arcs.len()).sum());
        let mut offsets = Vec::with_capacity(fst.states.len() + 1);
        let mut final_weights = Vec::with_capacity(fst.states.len());
        offsets.push(0);
        for state in &fst.states {
            arcs.extend_from_slice(&state.arcs);
            offsets.push(arcs.len() as u32);
            final_weights.push(state.final_weight);
        }
        Self {
            arcs,
            offsets,
            final_weights,
            start: fst.start,
            isymbols: fst.isymbols.clone(),
            osymbols: fst.osymbols.clone(),
        }
    }
}

impl ConstFst {
    /// Serialize to a writer.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// Serialize to a file.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_to(BufWriter::new(File::create(path)?))
    }

    /// Deserialize from a reader, rebuilding symbol indices and checking
    /// structural sanity.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut fst: ConstFst = bincode::deserialize_from(reader)?;
        fst.isymbols.rebuild_index();
        fst.osymbols.rebuild_index();
        fst.validate()?;
        Ok(fst)
    }

    /// Deserialize from a file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }

    fn validate(&self) -> Result<()> {
        let num_states = self.final_weights.len();
        if self.offsets.len() != num_states + 1
            || self.offsets.last().copied() != Some(self.arcs.len() as u32)
        {
            return Err(Error::Format("inconsistent arc offsets".into()));
        }
        if num_states > 0 && self.start >= num_states {
            return Err(Error::Format("start state out of range".into()));
        }
        if let Some(arc) = self.arcs.iter().find(|arc| arc.nextstate >= num_states) {
            return Err(Error::Format(format!(
                "arc destination {} out of range ({} states)",
                arc.nextstate, num_states
            )));
        }
        Ok(())
    }
}

impl Fst for ConstFst {
    fn start(&self) -> StateId {
        self.start
    }

    fn final_weight(&self, state: StateId) -> f32 {
        self.final_weights[state]
    }

    fn arcs(&self, state: StateId) -> &[Arc] {
        let begin = self.offsets[state] as usize;
        let end = self.offsets[state + 1] as usize;
        &self.arcs[begin..end]
    }

    fn num_states(&self) -> usize {
        self.final_weights.len()
    }

    fn input_symbols(&self) -> &SymbolTable {
        &self.isymbols
    }

    fn output_symbols(&self) -> &SymbolTable {
        &self.osymbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn two_state_fst() -> VectorFst {
        let mut fst = VectorFst::new(SymbolTable::with_reserved(), SymbolTable::with_reserved());
        let s0 = fst.add_state();
        let s1 = fst.add_state();
        fst.set_start(s0);
        fst.set_final(s1, 0.5);
        fst.add_arc(s0, Arc::with_weight(7, 7, 1.25, s1));
        fst.add_arc(s0, Arc::with_weight(5, 5, 0.25, s1));
        fst
    }

    #[test]
    fn vector_fst_basics() {
        let fst = two_state_fst();
        assert_eq!(fst.num_states(), 2);
        assert_eq!(fst.start(), 0);
        assert!(!fst.is_final(0));
        assert!(fst.is_final(1));
        assert_eq!(fst.num_arcs(0), 2);
        assert_eq!(fst.num_arcs(1), 0);
    }

    #[test]
    fn arc_sort_orders_by_ilabel() {
        let mut fst = two_state_fst();
        fst.arc_sort_ilabel();
        let labels: Vec<_> = fst.arcs(0).iter().map(|a| a.ilabel).collect();
        assert_eq!(labels, vec![5, 7]);
    }

    #[test]
    fn const_fst_mirrors_vector_fst() {
        let mut fst = two_state_fst();
        fst.arc_sort_ilabel();
        let cfst = ConstFst::from(&fst);
        assert_eq!(cfst.num_states(), 2);
        assert_eq!(cfst.final_weight(1), 0.5);
        assert_eq!(cfst.arcs(0), fst.arcs(0));
        assert!(cfst.arcs(1).is_empty());
    }

    #[test]
    fn const_fst_io_roundtrip() {
        let mut fst = two_state_fst();
        fst.arc_sort_ilabel();
        let cfst = ConstFst::from(&fst);
        let mut buffer = Vec::new();
        cfst.write_to(&mut buffer).unwrap();
        let loaded = ConstFst::read_from(&buffer[..]).unwrap();
        assert_eq!(loaded.num_states(), cfst.num_states());
        assert_eq!(loaded.arcs(0), cfst.arcs(0));
        assert_eq!(loaded.input_symbols().find("<unk>"), Some(crate::symbol::UNK));
        assert!(loaded.final_weight(0).is_infinite());
    }

    #[test]
    fn corrupt_offsets_are_rejected() {
        let fst = two_state_fst();
        let mut cfst = ConstFst::from(&fst);
        cfst.offsets.pop();
        let mut buffer = Vec::new();
        bincode::serialize_into(&mut buffer, &cfst).unwrap();
        assert!(ConstFst::read_from(&buffer[..]).is_err());
    }
}
