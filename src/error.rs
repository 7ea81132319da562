//! Error types shared across the crate.

use thiserror::Error;

/// Errors that can occur while building or querying completion engines.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid engine parameters (e.g. `beam_size < topk`).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed file open/read/write.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input data: bad vocabulary line, invalid UTF-8, or a
    /// symbol-table mismatch between encoder and language model.
    #[error("format error: {0}")]
    Format(String),

    /// A construction-time assumption was violated (missing phi arc,
    /// revisited state during traversal, state-count mismatch).
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// A run-time contract on the loaded automata failed, e.g. `<unk>`
    /// absent from the language model when phi back-off is exhausted.
    #[error("runtime invariant: {0}")]
    RuntimeInvariant(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// A specialized `Result` type for completion-engine operations.
pub type Result<T> = std::result::Result<T, Error>;
