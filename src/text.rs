//! Text helpers for the SPACE-sentinel convention.
//!
//! Queries are stored and modeled with the word boundary mapped to the
//! sentencepiece sentinel `▁` (U+2581); these helpers convert between the
//! user-facing form and the model-facing form.

use crate::symbol::SPACE;

/// Replace ASCII spaces with the `▁` sentinel.
pub fn spaces_to_sentinel(input: &str) -> String {
    input.chars().map(|c| if c == ' ' { SPACE } else { c }).collect()
}

/// Replace `▁` sentinels with ASCII spaces and collapse runs of
/// whitespace into single spaces, trimming the ends.
pub fn sentinel_to_spaces(input: &str) -> String {
    let mapped: String = input.chars().map(|c| if c == SPACE { ' ' } else { c }).collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse runs of whitespace into single spaces, trimming the ends.
pub fn normalize_spaces(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
