//! Command-line interface: build-time tools and test harnesses for the
//! completion engines.

mod args;
mod commands;

pub use args::{Cli, Commands};
pub use commands::execute;
