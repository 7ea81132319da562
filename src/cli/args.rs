//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI arguments.
#[derive(Parser)]
#[command(name = "queryblazer")]
#[command(about = "Query autocompletion from query logs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Build-time tools and test harnesses.
#[derive(Subcommand)]
pub enum Commands {
    /// Build the subword LPM encoder automaton from a vocabulary
    BuildEncoder {
        /// Vocabulary file, one subword per line (e.g. from sentencepiece)
        vocab: PathBuf,

        /// Where to write the encoder automaton
        output: PathBuf,
    },

    /// Build the most-popular-completion trie and cache from a query log
    BuildMpc {
        /// Query history file, one query per line
        train: PathBuf,

        /// Where to write the trie automaton
        trie: PathBuf,

        /// Where to write the completion cache
        completions: PathBuf,

        /// Completions precomputed per trie state
        #[arg(short = 'k', long, default_value = "10")]
        topk: usize,
    },

    /// Precompute per-state beam-search results for a language model
    BuildQueryblazer {
        /// Encoder automaton built by `build-encoder`
        encoder: PathBuf,

        /// Language model automaton with phi back-off
        model: PathBuf,

        /// Where to write the precomputed results
        output: PathBuf,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Tokenize a text file with the LPM encoder
    Encode {
        /// Encoder automaton
        encoder: PathBuf,

        /// Input text file, one line per sequence
        input: PathBuf,
    },

    /// Complete prefixes with the MPC engine and report throughput
    TestMpc {
        /// Trie automaton built by `build-mpc`
        trie: PathBuf,

        /// Completion cache built by `build-mpc`
        completions: PathBuf,

        /// File with one prefix per line
        prefixes: PathBuf,
    },

    /// Complete prefixes with the QueryBlazer engine and report throughput
    TestQueryblazer {
        /// Encoder automaton
        encoder: PathBuf,

        /// Language model automaton
        model: PathBuf,

        /// File with one prefix per line
        prefixes: PathBuf,

        /// Precomputed results from `build-queryblazer`; computed lazily
        /// when absent
        #[arg(short, long)]
        precomputed: Option<PathBuf>,

        #[command(flatten)]
        search: SearchArgs,
    },
}

/// Beam-search parameters shared by the QueryBlazer subcommands.
#[derive(clap::Args)]
pub struct SearchArgs {
    /// Per-state fan-out cap during beam expansion
    #[arg(long, default_value = "30")]
    pub branch_factor: usize,

    /// Live beams kept per expansion round
    #[arg(long, default_value = "30")]
    pub beam_size: usize,

    /// Completions returned per prefix
    #[arg(short = 'k', long, default_value = "10")]
    pub topk: usize,

    /// Maximum emitted-token length of a completion
    #[arg(long, default_value = "100")]
    pub length_limit: usize,

    /// Log beam-search diagnostics
    #[arg(short, long)]
    pub verbose: bool,
}

impl SearchArgs {
    /// Convert to an engine config.
    pub fn to_config(&self, precompute: bool) -> crate::blazer::Config {
        crate::blazer::Config {
            branch_factor: self.branch_factor,
            beam_size: self.beam_size,
            topk: self.topk,
            length_limit: self.length_limit,
            precompute,
            verbose: self.verbose,
        }
    }
}
