//! CLI command implementations.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::blazer::QueryBlazer;
use crate::encoder::{build_encoder, read_vocabulary, Encoder};
use crate::fst::ConstFst;
use crate::mpc::{build_trie, count_queries, Mpc};
use crate::symbol::UNK;
use crate::text::{normalize_spaces, spaces_to_sentinel};

use super::args::{Commands, SearchArgs};

/// Execute a CLI command.
pub fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::BuildEncoder { vocab, output } => cmd_build_encoder(&vocab, &output),
        Commands::BuildMpc { train, trie, completions, topk } => {
            cmd_build_mpc(&train, &trie, &completions, topk)
        }
        Commands::BuildQueryblazer { encoder, model, output, search } => {
            cmd_build_queryblazer(&encoder, &model, &output, &search)
        }
        Commands::Encode { encoder, input } => cmd_encode(&encoder, &input),
        Commands::TestMpc { trie, completions, prefixes } => {
            cmd_test_mpc(&trie, &completions, &prefixes)
        }
        Commands::TestQueryblazer { encoder, model, prefixes, precomputed, search } => {
            cmd_test_queryblazer(&encoder, &model, &prefixes, precomputed, &search)
        }
    }
}

fn open_lines(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
    ))
}

fn cmd_build_encoder(vocab: &Path, output: &Path) -> Result<()> {
    let vocabulary = read_vocabulary(open_lines(vocab)?)
        .with_context(|| format!("failed to read vocabulary {}", vocab.display()))?;
    eprintln!("read {} valid tokens", vocabulary.len().to_string().cyan());

    let encoder = build_encoder(&vocabulary).context("encoder construction failed")?;
    encoder
        .write(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    eprintln!("{} encoder written to {}", "done:".green(), output.display());
    Ok(())
}

fn cmd_build_mpc(train: &Path, trie_path: &Path, completions: &Path, topk: usize) -> Result<()> {
    let (queries, counts) = count_queries(open_lines(train)?)?;
    eprintln!("counted {} distinct queries", queries.len().to_string().cyan());

    eprintln!("building the query trie...");
    let (trie, state_queries, state_counts) = build_trie(&queries, &counts)?;
    trie.write(trie_path)
        .with_context(|| format!("failed to write {}", trie_path.display()))?;

    eprintln!("precomputing top-{topk} completions...");
    let mut mpc = Mpc::new(trie, state_queries, state_counts)?;
    mpc.find_completions(topk)?;
    let writer = BufWriter::new(
        File::create(completions)
            .with_context(|| format!("failed to create {}", completions.display()))?,
    );
    mpc.save(writer)?;
    eprintln!("{} mpc written to {}", "done:".green(), completions.display());
    Ok(())
}

fn cmd_build_queryblazer(
    encoder: &Path,
    model: &Path,
    output: &Path,
    search: &SearchArgs,
) -> Result<()> {
    let encoder = ConstFst::read(encoder)
        .with_context(|| format!("invalid encoder: {}", encoder.display()))?;
    let model =
        ConstFst::read(model).with_context(|| format!("invalid model: {}", model.display()))?;

    let blazer = QueryBlazer::new(encoder, model, search.to_config(true))?;
    let writer = BufWriter::new(
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?,
    );
    if !blazer.save_precomputed(writer)? {
        bail!("precomputation failed");
    }
    eprintln!("{} precomputed results written to {}", "done:".green(), output.display());
    Ok(())
}

fn cmd_encode(encoder: &Path, input: &Path) -> Result<()> {
    let encoder = Encoder::new(
        ConstFst::read(encoder)
            .with_context(|| format!("failed to read encoder {}", encoder.display()))?,
    )?;

    for line in open_lines(input)?.lines() {
        let line = spaces_to_sentinel(&normalize_spaces(&line?));
        let (ilabels, oovs) = encoder.map_ilabels(&line);
        let (olabels, _) = encoder.encode(&ilabels, true)?;

        // consecutive OOV characters are written as a single token
        let mut output: Vec<String> = Vec::new();
        let mut oov_idx = 0;
        let mut prev_oov = false;
        for olabel in olabels {
            if olabel == UNK {
                let c = oovs[oov_idx];
                oov_idx += 1;
                if prev_oov {
                    output.last_mut().expect("previous oov token exists").push(c);
                } else {
                    output.push(c.to_string());
                }
                prev_oov = true;
            } else {
                output.push(
                    encoder
                        .output_symbols()
                        .name(olabel)
                        .context("unknown output label")?
                        .to_string(),
                );
                prev_oov = false;
            }
        }
        if oov_idx != oovs.len() {
            bail!("oov buffer size mismatch");
        }

        println!("{}", output.join(" "));
    }
    Ok(())
}

fn cmd_test_mpc(trie: &Path, completions: &Path, prefixes: &Path) -> Result<()> {
    let trie =
        ConstFst::read(trie).with_context(|| format!("failed to read {}", trie.display()))?;
    let mpc = Mpc::load(trie, open_lines(completions)?)?;

    let start = Instant::now();
    let mut count = 0usize;
    for prefix in open_lines(prefixes)?.lines() {
        let results = mpc.complete(&prefix?);
        let texts: Vec<&str> = results.iter().map(|(text, _)| text.as_str()).collect();
        println!("{}", texts.join("\t"));
        count += 1;
    }
    report_throughput(count, start);
    Ok(())
}

fn cmd_test_queryblazer(
    encoder: &Path,
    model: &Path,
    prefixes: &Path,
    precomputed: Option<PathBuf>,
    search: &SearchArgs,
) -> Result<()> {
    let encoder = ConstFst::read(encoder)
        .with_context(|| format!("invalid encoder: {}", encoder.display()))?;
    let model =
        ConstFst::read(model).with_context(|| format!("invalid model: {}", model.display()))?;
    let mut blazer = QueryBlazer::new(encoder, model, search.to_config(false))?;

    if let Some(path) = precomputed {
        eprintln!("loading precomputed results from {}", path.display());
        if !blazer.load_precomputed(open_lines(&path)?)? {
            eprintln!("{} precomputed results do not match; computing lazily", "note:".yellow());
        }
    }

    let start = Instant::now();
    let mut count = 0usize;
    for prefix in open_lines(prefixes)?.lines() {
        let (suggestions, _) = blazer.complete(&prefix?)?;
        let texts: Vec<&str> = suggestions.iter().map(|(text, _)| text.as_str()).collect();
        println!("{}", texts.join("\t"));
        count += 1;
    }
    report_throughput(count, start);
    Ok(())
}

fn report_throughput(count: usize, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        eprintln!("completion speed: {:.1} QPS", count as f64 / elapsed);
    }
}
