//! Symbol tables mapping string tokens to dense integer labels.
//!
//! Every automaton in this crate carries two tables: one for input labels
//! and one for output labels. The first five labels are reserved in a
//! fixed order so that the special symbols have the same ids everywhere.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Integer label stored on automaton arcs.
pub type Label = u32;

/// The epsilon (no-op) label.
pub const EPSILON: Label = 0;
/// The failure-arc label.
pub const PHI: Label = 1;
/// Beginning-of-sequence label.
pub const BOS: Label = 2;
/// End-of-sequence label.
pub const EOS: Label = 3;
/// Unknown-token label.
pub const UNK: Label = 4;

/// Textual forms of the reserved symbols, in label order.
pub const RESERVED_SYMBOLS: [&str; 5] = ["<eps>", "<phi>", "<s>", "</s>", "<unk>"];

/// Word-boundary sentinel code point, adopted from sentencepiece.
pub const SPACE: char = '\u{2581}';

/// A bijection between string tokens and dense labels.
///
/// Labels are assigned in insertion order starting at zero, so a table
/// created with [`SymbolTable::with_reserved`] hands out user labels
/// starting at `5`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<String>,
    #[serde(skip)]
    index: FxHashMap<String, Label>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table pre-populated with the five reserved symbols.
    pub fn with_reserved() -> Self {
        let mut table = Self::new();
        for symbol in RESERVED_SYMBOLS {
            table.add_symbol(symbol);
        }
        table
    }

    /// Insert a symbol, returning its label. Inserting an existing symbol
    /// returns the previously assigned label.
    pub fn add_symbol(&mut self, symbol: &str) -> Label {
        if let Some(&label) = self.index.get(symbol) {
            return label;
        }
        let label = self.symbols.len() as Label;
        self.symbols.push(symbol.to_string());
        self.index.insert(symbol.to_string(), label);
        label
    }

    /// Look up the label for a symbol.
    pub fn find(&self, symbol: &str) -> Option<Label> {
        self.index.get(symbol).copied()
    }

    /// Look up the symbol for a label.
    pub fn name(&self, label: Label) -> Option<&str> {
        self.symbols.get(label as usize).map(String::as_str)
    }

    /// Number of symbols in the table.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// One past the largest assigned label.
    pub fn available_key(&self) -> Label {
        self.symbols.len() as Label
    }

    /// CRC32 over every `(label, symbol)` pair.
    ///
    /// Two tables with the same symbols bound to the same labels produce
    /// the same checksum; used to verify that the encoder's output
    /// alphabet and the language model's input alphabet agree.
    pub fn labeled_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for (label, symbol) in self.symbols.iter().enumerate() {
            hasher.update(&(label as u32).to_le_bytes());
            hasher.update(symbol.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize()
    }

    /// Rebuild the string-to-label index after deserialization.
    ///
    /// `serde(skip)` leaves the index empty on load; every deserialization
    /// path must call this before `find` is usable.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .symbols
            .iter()
            .enumerate()
            .map(|(label, symbol)| (symbol.clone(), label as Label))
            .collect();
    }

    /// Verify the reserved symbols occupy their fixed labels.
    pub fn check_reserved(&self) -> Result<()> {
        for (label, expected) in RESERVED_SYMBOLS.iter().enumerate() {
            match self.name(label as Label) {
                Some(found) if found == *expected => {}
                other => {
                    return Err(Error::Format(format!(
                        "reserved symbol {expected:?} missing at label {label}, found {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_labels_are_fixed() {
        let table = SymbolTable::with_reserved();
        assert_eq!(table.find("<eps>"), Some(EPSILON));
        assert_eq!(table.find("<phi>"), Some(PHI));
        assert_eq!(table.find("<s>"), Some(BOS));
        assert_eq!(table.find("</s>"), Some(EOS));
        assert_eq!(table.find("<unk>"), Some(UNK));
        assert_eq!(table.available_key(), 5);
        assert!(table.check_reserved().is_ok());
    }

    #[test]
    fn user_symbols_start_at_five() {
        let mut table = SymbolTable::with_reserved();
        assert_eq!(table.add_symbol("hello"), 5);
        assert_eq!(table.add_symbol("world"), 6);
        assert_eq!(table.add_symbol("hello"), 5);
        assert_eq!(table.name(6), Some("world"));
    }

    #[test]
    fn checksum_tracks_label_bindings() {
        let mut a = SymbolTable::with_reserved();
        let mut b = SymbolTable::with_reserved();
        a.add_symbol("x");
        a.add_symbol("y");
        b.add_symbol("x");
        b.add_symbol("y");
        assert_eq!(a.labeled_checksum(), b.labeled_checksum());

        let mut c = SymbolTable::with_reserved();
        c.add_symbol("y");
        c.add_symbol("x");
        assert_ne!(a.labeled_checksum(), c.labeled_checksum());
    }

    #[test]
    fn index_survives_serde_roundtrip() {
        let mut table = SymbolTable::with_reserved();
        table.add_symbol("abc");
        let bytes = bincode::serialize(&table).unwrap();
        let mut loaded: SymbolTable = bincode::deserialize(&bytes).unwrap();
        loaded.rebuild_index();
        assert_eq!(loaded.find("abc"), Some(5));
        assert_eq!(loaded.labeled_checksum(), table.labeled_checksum());
    }
}
