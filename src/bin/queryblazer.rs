//! Command-line entry point for the completion engines.

use clap::Parser;
use queryblazer::cli::{execute, Cli};

fn main() {
    let cli = Cli::parse();
    if let Err(err) = execute(cli.command) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
