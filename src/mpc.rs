//! Most-popular-completion engine.
//!
//! A character trie over the training queries, stored as an automaton,
//! with a per-state cache of the top-k most frequent queries reachable
//! from that state. Answering a prefix is a walk to the prefix's state
//! followed by a cache lookup.

use crate::error::{Error, Result};
use crate::fst::matcher::{Matcher, SortedMatcher};
use crate::fst::{Arc, ConstFst, Fst, StateId, VectorFst};
use crate::prefix_tree::PrefixTree;
use crate::symbol::{Label, SymbolTable};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::io::{BufRead, Read, Write};

/// Count exact-duplicate queries, one query per line.
pub fn count_queries<R: BufRead>(reader: R) -> Result<(Vec<String>, Vec<u64>)> {
    let mut counter: FxHashMap<String, u64> = FxHashMap::default();
    for line in reader.lines() {
        *counter.entry(line?).or_insert(0) += 1;
    }
    let mut queries = Vec::with_capacity(counter.len());
    let mut counts = Vec::with_capacity(counter.len());
    for (query, count) in counter {
        queries.push(query);
        counts.push(count);
    }
    Ok((queries, counts))
}

/// Build the query trie as an automaton with `ilabel == olabel ==`
/// code-point label, together with the per-state query text and count
/// (empty / zero for non-final states).
pub fn build_trie(queries: &[String], counts: &[u64]) -> Result<(ConstFst, Vec<String>, Vec<u64>)> {
    if queries.len() != counts.len() {
        return Err(Error::InvariantViolated("queries & counts size mismatch".into()));
    }

    let mut symbols = SymbolTable::with_reserved();
    let characters: BTreeSet<char> = queries.iter().flat_map(|q| q.chars()).collect();
    let mut buffer = [0u8; 4];
    for c in &characters {
        symbols.add_symbol(c.encode_utf8(&mut buffer));
    }

    let mut tree: PrefixTree<Label, u64> = PrefixTree::new();
    for (query, &count) in queries.iter().zip(counts) {
        let ilabels: Vec<Label> = query
            .chars()
            .map(|c| {
                symbols
                    .find(c.encode_utf8(&mut buffer))
                    .expect("every query character was added to the table")
            })
            .collect();
        tree.upsert(&ilabels, count, |total, add| *total += add);
    }

    // Breadth-first copy into the automaton, children in label order so
    // arcs come out input-sorted.
    let mut trie = VectorFst::new(symbols.clone(), symbols);
    let start = trie.add_state();
    trie.set_start(start);
    let mut state_counts = vec![0u64];
    let mut state_queries = vec![String::new()];

    let mut queue = VecDeque::from([(tree.root(), start)]);
    while let Some((node, state)) = queue.pop_front() {
        for (&label, child) in tree.children(node) {
            let nextstate = trie.add_state();
            state_counts.push(0);
            state_queries.push(String::new());
            trie.add_arc(state, Arc::new(label, label, nextstate));
            queue.push_back((child, nextstate));
        }

        if let Some(&count) = tree.data(node) {
            trie.set_final(state, 0.0);
            state_counts[state] = count;
            let mut text = String::new();
            for label in tree.prefix(node) {
                text.push_str(
                    trie.input_symbols()
                        .name(label)
                        .expect("trie labels come from the table"),
                );
            }
            state_queries[state] = text;
        }
    }

    trie.arc_sort_ilabel();
    Ok((ConstFst::from(&trie), state_queries, state_counts))
}

/// Serialized per-state completion cache.
#[derive(Serialize, Deserialize)]
struct MpcCache {
    num_states: u64,
    /// Per state: `(count, state_id)` pairs, best first.
    completions: Vec<Vec<(u64, u64)>>,
    queries: Vec<String>,
}

/// The most-popular-completion server.
pub struct Mpc {
    trie: ConstFst,
    queries: Vec<String>,
    counts: Vec<u64>,
    /// Per state: `(count, state_id)` pairs sorted by count descending.
    completions: Vec<Vec<(u64, StateId)>>,
}

impl Mpc {
    /// Wrap a freshly built trie with its per-state queries and counts.
    /// Call [`Mpc::find_completions`] before serving.
    pub fn new(trie: ConstFst, queries: Vec<String>, counts: Vec<u64>) -> Result<Self> {
        if trie.num_states() != counts.len() || queries.len() != counts.len() {
            return Err(Error::InvariantViolated("queries & counts size mismatch".into()));
        }
        let completions = vec![Vec::new(); queries.len()];
        Ok(Self { trie, queries, counts, completions })
    }

    /// Load a trie plus a previously serialized completion cache.
    pub fn load<R: Read>(trie: ConstFst, reader: R) -> Result<Self> {
        let cache: MpcCache = bincode::deserialize_from(reader)?;
        let num_states = trie.num_states();
        if cache.num_states != num_states as u64
            || cache.completions.len() != num_states
            || cache.queries.len() != num_states
        {
            return Err(Error::Format("completion cache does not match the trie".into()));
        }
        let completions = cache
            .completions
            .into_iter()
            .map(|list| list.into_iter().map(|(count, state)| (count, state as StateId)).collect())
            .collect();
        Ok(Self { trie, queries: cache.queries, counts: Vec::new(), completions })
    }

    /// Serialize the completion cache (the trie is stored separately).
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let cache = MpcCache {
            num_states: self.trie.num_states() as u64,
            completions: self
                .completions
                .iter()
                .map(|list| list.iter().map(|&(count, state)| (count, state as u64)).collect())
                .collect(),
            queries: self.queries.clone(),
        };
        bincode::serialize_into(writer, &cache)?;
        Ok(())
    }

    /// Precompute the top-`topk` completion list of every state.
    ///
    /// Post-order over the trie with an explicit stack; long queries
    /// would otherwise exhaust the call stack. Each state merges its own
    /// entry (when final) with its children's lists, sorts by count
    /// descending (ties by state id descending), and truncates.
    ///
    /// `topk` must be positive: with at least one entry kept per state,
    /// every cached list below a reachable query is non-empty, which is
    /// what makes calling this again on a loaded instance a no-op.
    pub fn find_completions(&mut self, topk: usize) -> Result<()> {
        if topk == 0 {
            return Err(Error::Config("top k must be positive".into()));
        }
        let start = self.trie.start();
        // (state, next child arc to visit)
        let mut stack: Vec<(StateId, usize)> = vec![(start, 0)];
        while let Some(&mut (state, ref mut next_child)) = stack.last_mut() {
            // already cached (e.g. restored from a serialized cache)
            if *next_child == 0 && !self.completions[state].is_empty() {
                stack.pop();
                continue;
            }
            let arcs = self.trie.arcs(state);
            if *next_child < arcs.len() {
                let child = arcs[*next_child].nextstate;
                *next_child += 1;
                stack.push((child, 0));
                continue;
            }
            stack.pop();

            let mut result: Vec<(u64, StateId)> = Vec::new();
            if !self.queries[state].is_empty() {
                result.push((self.counts[state], state));
            }
            for arc in arcs {
                result.extend_from_slice(&self.completions[arc.nextstate]);
            }
            result.sort_unstable_by(|a, b| b.cmp(a));
            result.truncate(topk);
            self.completions[state] = result;
        }
        Ok(())
    }

    /// Top completions for `prefix`: training queries extending it, most
    /// frequent first. An unseen prefix yields an empty list.
    pub fn complete(&self, prefix: &str) -> Vec<(String, u64)> {
        let mut matcher = SortedMatcher::new(&self.trie);
        let mut state = self.trie.start();
        let mut buffer = [0u8; 4];
        for c in prefix.chars() {
            let Some(ilabel) = self.trie.input_symbols().find(c.encode_utf8(&mut buffer)) else {
                return Vec::new();
            };
            matcher.set_state(state);
            if !matcher.find(ilabel) {
                return Vec::new();
            }
            state = matcher.value().nextstate;
        }

        self.completions[state]
            .iter()
            .map(|&(count, id)| (self.queries[id].clone(), count))
            .collect()
    }

    /// The underlying trie automaton.
    pub fn trie(&self) -> &ConstFst {
        &self.trie
    }
}
