//! # queryblazer
//!
//! Query autocompletion from historical query logs.
//!
//! Given a user-typed prefix, the engines in this crate return the
//! top-k most likely full queries:
//!
//! - [`QueryBlazer`](blazer::QueryBlazer) ranks completions with a
//!   subword n-gram language model represented as a weighted automaton
//!   with phi (failure) back-off arcs, and generalizes to prefixes never
//!   seen in training. Prefixes are tokenized by a deterministic
//!   longest-prefix-match encoder automaton; completions come from a
//!   beam search over the model, with per-state results optionally
//!   precomputed in bulk.
//! - [`Mpc`](mpc::Mpc) (most-popular-completion) is the classic
//!   baseline: a trie over the training queries answering each seen
//!   prefix with the most frequent queries extending it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use queryblazer::prelude::*;
//!
//! let encoder = ConstFst::read("encoder.fst")?;
//! let model = ConstFst::read("model.fst")?;
//! let blazer = QueryBlazer::new(encoder, model, Config::default())?;
//!
//! let (suggestions, _) = blazer.complete("how to")?;
//! for (text, cost) in suggestions {
//!     println!("{cost:.3}\t{text}");
//! }
//! ```
//!
//! The language model itself is trained externally (any toolchain that
//! emits a weighted automaton with phi back-off works) and must satisfy
//! two contracts this crate documents but cannot verify: its input
//! alphabet equals the encoder's output alphabet, and its back-off
//! chains bottom out at a unigram state emitting every token including
//! `<unk>`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blazer;
pub mod cli;
pub mod encoder;
pub mod error;
pub mod fst;
pub mod mpc;
pub mod prefix_tree;
pub mod symbol;
pub mod text;
pub mod topk;

/// Common imports for convenient usage.
pub mod prelude {
    pub use crate::blazer::{Config, QueryBlazer};
    pub use crate::encoder::{build_encoder, read_vocabulary, Encoder};
    pub use crate::error::{Error, Result};
    pub use crate::fst::{ConstFst, Fst, VectorFst};
    pub use crate::mpc::Mpc;
    pub use crate::symbol::SymbolTable;
}
