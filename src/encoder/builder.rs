//! Construction of the LPM encoder automaton.
//!
//! The automaton is grown in three passes:
//!
//! 1. every vocabulary token becomes a path of code-point arcs ending in
//!    a phi arc that emits the token and returns to the start state
//!    ("emit and restart": a token is only emitted once no longer token
//!    can continue);
//! 2. the path union is determinized into a prefix tree and sorted;
//! 3. phi back-off arcs are installed breadth-first so that every
//!    non-start state can resolve any input code point, then the result
//!    is minimized and re-sorted.

use crate::error::{Error, Result};
use crate::fst::algorithms::{determinize, minimize};
use crate::fst::matcher::UnsortedMatcher;
use crate::fst::transition::{make_transitions, OlabelBuffer};
use crate::fst::{Arc, ConstFst, Fst, StateId, VectorFst};
use crate::symbol::{Label, SymbolTable, EPSILON, PHI, RESERVED_SYMBOLS};
use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};
use std::io::BufRead;

/// Read a subword vocabulary, one token per line.
///
/// Empty lines are skipped and the reserved `<unk>`, `<s>` and `</s>`
/// entries emitted by subword trainers are dropped. A line with more
/// than one whitespace-separated field is malformed. Tokens are returned
/// sorted and deduplicated.
pub fn read_vocabulary<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut vocabulary = BTreeSet::new();
    for line in reader.lines() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(token) = fields.next() else {
            continue;
        };
        if fields.next().is_some() {
            return Err(Error::Format(format!("invalid vocabulary line: {line:?}")));
        }
        vocabulary.insert(token.to_string());
    }
    for reserved in &RESERVED_SYMBOLS[2..] {
        vocabulary.remove(*reserved);
    }
    Ok(vocabulary.into_iter().collect())
}

/// Build the LPM encoder automaton from a sorted vocabulary.
///
/// The input symbol table holds the distinct code points appearing in
/// the vocabulary; the output table holds the tokens themselves. The
/// start state is both initial and final.
pub fn build_encoder(vocabulary: &[String]) -> Result<ConstFst> {
    if vocabulary.is_empty() {
        return Err(Error::Format("empty vocabulary".into()));
    }

    let mut isymbols = SymbolTable::with_reserved();
    let characters: BTreeSet<char> = vocabulary.iter().flat_map(|t| t.chars()).collect();
    let mut buffer = [0u8; 4];
    for c in &characters {
        isymbols.add_symbol(c.encode_utf8(&mut buffer));
    }

    let mut osymbols = SymbolTable::with_reserved();
    for token in vocabulary {
        osymbols.add_symbol(token);
    }

    let mut encoder = VectorFst::new(isymbols, osymbols);
    let start = encoder.add_state();
    encoder.set_start(start);
    encoder.set_final(start, 0.0);

    for token in vocabulary {
        add_token(&mut encoder, token)?;
    }

    let mut encoder = determinize(&encoder)?;
    encoder.arc_sort_ilabel();

    add_phi_transitions(&mut encoder)?;

    let mut encoder = minimize(&encoder);
    encoder.arc_sort_ilabel();

    Ok(ConstFst::from(&encoder))
}

/// Add one token as a path of code-point arcs ending in an
/// emit-and-restart phi arc.
fn add_token(encoder: &mut VectorFst, token: &str) -> Result<()> {
    let start = encoder.start();
    let olabel = encoder
        .output_symbols()
        .find(token)
        .ok_or_else(|| Error::InvariantViolated(format!("token {token:?} missing from output table")))?;

    let mut src = start;
    let mut buffer = [0u8; 4];
    for c in token.chars() {
        let ilabel = encoder
            .input_symbols()
            .find(c.encode_utf8(&mut buffer))
            .ok_or_else(|| {
                Error::InvariantViolated(format!("code point {c:?} missing from input table"))
            })?;
        let dst = encoder.add_state();
        encoder.add_arc(src, Arc::new(ilabel, EPSILON, dst));
        src = dst;
    }
    encoder.add_arc(src, Arc::new(PHI, olabel, start));
    Ok(())
}

/// Install a phi back-off arc on every state that lacks one.
///
/// Walks the tree of non-phi arcs breadth-first. A state reached from
/// its parent `p` via code point `i` backs off the way its parent does:
/// take `p`'s phi, then consume `i` from wherever that lands. The labels
/// emitted along that walk become the state's phi chain, with
/// intermediate states inserted so each phi arc emits one label.
fn add_phi_transitions(encoder: &mut VectorFst) -> Result<()> {
    struct Traverse {
        state: StateId,
        prev_state: StateId,
        ilabel: Label,
    }

    let start = encoder.start();
    let mut visited: FxHashSet<StateId> = FxHashSet::default();
    let mut queue = VecDeque::from([Traverse { state: start, prev_state: start, ilabel: EPSILON }]);

    while let Some(Traverse { state, prev_state, ilabel }) = queue.pop_front() {
        if !visited.insert(state) {
            return Err(Error::InvariantViolated(format!("state {state} visited again")));
        }

        let mut to_add_phi = state != start;
        for arc in encoder.arcs(state) {
            if arc.ilabel == PHI {
                to_add_phi = false;
                continue;
            }
            if arc.nextstate == start {
                continue;
            }
            queue.push_back(Traverse { state: arc.nextstate, prev_state: state, ilabel: arc.ilabel });
        }

        if !to_add_phi {
            continue;
        }

        // Take the parent's phi, then consume our arc label; the emitted
        // labels form this state's back-off chain. Fails when the
        // vocabulary does not cover a token's leading character.
        let mut olabels = OlabelBuffer::new();
        let dest = {
            let mut matcher = UnsortedMatcher::new(encoder);
            let (dest, _) = make_transitions(encoder, &mut matcher, prev_state, PHI, &mut olabels)?;
            let (dest, _) = make_transitions(encoder, &mut matcher, dest, ilabel, &mut olabels)?;
            dest
        };
        if olabels.is_empty() {
            return Err(Error::InvariantViolated(format!(
                "empty back-off emission for state {state}"
            )));
        }

        let mut src = state;
        for &olabel in &olabels[..olabels.len() - 1] {
            let chain = encoder.add_state();
            encoder.add_arc(src, Arc::new(PHI, olabel, chain));
            src = chain;
        }
        encoder.add_arc(src, Arc::new(PHI, *olabels.last().expect("non-empty"), dest));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::UNK;

    fn vocab(tokens: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        v.sort();
        v
    }

    #[test]
    fn read_vocabulary_filters_reserved_and_dedups() {
        let input = "hello\n<unk>\n\nworld\nhello\n<s>\n</s>\n";
        let vocab = read_vocabulary(input.as_bytes()).unwrap();
        assert_eq!(vocab, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn read_vocabulary_rejects_multi_field_lines() {
        assert!(read_vocabulary("hello world\n".as_bytes()).is_err());
    }

    #[test]
    fn symbol_tables_cover_alphabet_and_tokens() {
        let encoder = build_encoder(&vocab(&["a", "ab", "b"])).unwrap();
        assert!(encoder.input_symbols().find("a").is_some());
        assert!(encoder.input_symbols().find("b").is_some());
        assert!(encoder.input_symbols().find("ab").is_none());
        assert!(encoder.output_symbols().find("ab").is_some());
        assert_eq!(encoder.input_symbols().find("<unk>"), Some(UNK));
    }

    #[test]
    fn start_state_is_final() {
        let encoder = build_encoder(&vocab(&["a", "b"])).unwrap();
        assert!(encoder.is_final(encoder.start()));
    }

    #[test]
    fn every_non_start_state_has_one_phi_arc() {
        let encoder = build_encoder(&vocab(&["a", "ab", "abc", "b", "bc", "c"])).unwrap();
        for state in 0..encoder.num_states() {
            let phi_arcs = encoder.arcs(state).iter().filter(|a| a.ilabel == PHI).count();
            if state == encoder.start() {
                assert_eq!(phi_arcs, 0, "start state must not back off");
            } else {
                assert_eq!(phi_arcs, 1, "state {state} must have exactly one phi arc");
            }
        }
    }

    #[test]
    fn arcs_are_input_sorted_and_deterministic() {
        let encoder = build_encoder(&vocab(&["a", "ab", "ac", "b", "c"])).unwrap();
        for state in 0..encoder.num_states() {
            let labels: Vec<Label> = encoder.arcs(state).iter().map(|a| a.ilabel).collect();
            let mut sorted = labels.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(labels, sorted, "state {state} arcs must be sorted and unique");
        }
    }

    #[test]
    fn uncovered_leading_character_is_rejected() {
        // "xy" backs off after 'x', but 'x' alone is not a token, so the
        // depth-one state has no shorter context to fall back to.
        assert!(build_encoder(&vocab(&["xy", "y"])).is_err());
    }
}
