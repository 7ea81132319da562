//! Property-based tests for the encoder and the MPC engine.

use proptest::prelude::*;
use queryblazer::encoder::{build_encoder, Encoder};
use queryblazer::fst::Fst;
use queryblazer::mpc::{build_trie, count_queries, Mpc};
use queryblazer::symbol::{Label, PHI, SPACE, UNK};

fn sorted_vocab(tokens: &[&str]) -> Vec<String> {
    let mut vocab: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    vocab.sort();
    vocab
}

fn test_encoder() -> Encoder {
    // full single-character coverage plus longer subwords; "cda" has a
    // non-token prefix "cd", so its middle state needs a synthesized
    // back-off chain
    let vocab = sorted_vocab(&[
        &SPACE.to_string(), "a", "b", "c", "d", "aa", "ab", "abc", "bc", "ca", "cda", "dd",
    ]);
    Encoder::new(build_encoder(&vocab).unwrap()).unwrap()
}

/// Decode an olabel sequence back to text, substituting OOV characters
/// for `<unk>` in order.
fn reconstruct(encoder: &Encoder, olabels: &[Label], oovs: &[char]) -> String {
    let mut text = String::new();
    let mut oov_idx = 0;
    for &olabel in olabels {
        if olabel == UNK {
            text.push(oovs[oov_idx]);
            oov_idx += 1;
        } else {
            text.push_str(encoder.output_symbols().name(olabel).unwrap());
        }
    }
    assert_eq!(oov_idx, oovs.len(), "every oov must be consumed");
    text
}

proptest! {
    /// Complete encodings concatenate back to their input ('x' and 'y'
    /// are out of vocabulary and exercise the UNK path).
    #[test]
    fn encoding_roundtrips_to_input(input in "[abcdxy]{0,16}") {
        let encoder = test_encoder();
        let (ilabels, oovs) = encoder.map_ilabels(&input);
        let start = encoder.fst().start();
        let (olabels, out_state) = encoder.encode_from(start, &ilabels, true).unwrap();
        prop_assert_eq!(reconstruct(&encoder, &olabels, &oovs), input);
        prop_assert_eq!(out_state, start);
    }

    /// The first emitted token is the longest vocabulary token prefixing
    /// the input.
    #[test]
    fn first_token_is_the_longest_match(input in "[abcd]{1,12}") {
        let encoder = test_encoder();
        let (ilabels, _) = encoder.map_ilabels(&input);
        let start = encoder.fst().start();
        let (olabels, _) = encoder.encode_from(start, &ilabels, true).unwrap();

        let expected = ["abc", "cda", "aa", "ab", "bc", "ca", "dd", "a", "b", "c", "d"]
            .iter()
            .filter(|t| input.starts_with(**t))
            .max_by_key(|t| t.len())
            .copied()
            .unwrap();
        let first = encoder.output_symbols().name(olabels[0]).unwrap();
        prop_assert_eq!(first, expected);
    }

    /// Incomplete then completed encoding agrees with one-shot complete
    /// encoding once the pending suffix is flushed.
    #[test]
    fn incremental_encoding_is_consistent(input in "[abcd]{0,12}") {
        let encoder = test_encoder();
        let (ilabels, _) = encoder.map_ilabels(&input);
        let start = encoder.fst().start();

        let (mut partial, state) = encoder.encode_from(start, &ilabels, false).unwrap();
        let (flushed, _) = encoder.encode_from(state, &[], true).unwrap();
        partial.extend(flushed);

        let (complete, _) = encoder.encode_from(start, &ilabels, true).unwrap();
        prop_assert_eq!(partial, complete);
    }
}

/// Every non-start encoder state carries exactly one phi arc; the start
/// state carries none.
#[test]
fn phi_arcs_are_total() {
    let encoder = test_encoder();
    let fst = encoder.fst();
    for state in 0..fst.num_states() {
        let phi_arcs = fst.arcs(state).iter().filter(|a| a.ilabel == PHI).count();
        if state == fst.start() {
            assert_eq!(phi_arcs, 0);
        } else {
            assert_eq!(phi_arcs, 1, "state {state}");
        }
    }
}

proptest! {
    /// MPC answers agree with a brute-force scan of the query log.
    #[test]
    fn mpc_matches_brute_force(
        log in proptest::collection::vec("[abc]{1,4}", 1..24),
        prefix in "[abc]{0,3}",
    ) {
        let text = log.join("\n");
        let (queries, counts) = count_queries(text.as_bytes()).unwrap();
        let (trie, state_queries, state_counts) = build_trie(&queries, &counts).unwrap();
        let mut mpc = Mpc::new(trie, state_queries, state_counts).unwrap();
        let topk = 3;
        mpc.find_completions(topk).unwrap();

        let results = mpc.complete(&prefix);

        // expected size and membership
        let mut expected: Vec<(String, u64)> = queries
            .iter()
            .zip(&counts)
            .filter(|(q, _)| q.starts_with(&prefix))
            .map(|(q, &c)| (q.clone(), c))
            .collect();
        prop_assert_eq!(results.len(), expected.len().min(topk));

        // sorted by count descending
        prop_assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));

        // every answer is a genuine completion with its true count
        for (query, count) in &results {
            prop_assert!(query.starts_with(&prefix));
            prop_assert!(expected.contains(&(query.clone(), *count)));
        }

        // nothing better was left out
        expected.sort_by(|a, b| b.1.cmp(&a.1));
        if let (Some(worst_kept), Some(best)) = (results.last(), expected.get(results.len())) {
            prop_assert!(worst_kept.1 >= best.1);
        }
    }
}
