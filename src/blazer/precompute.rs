//! Bulk precomputation of per-state beam-search results, and the cache
//! file format.
//!
//! Both passes are embarrassingly parallel over model states: each task
//! fills its own state's cache slot and reads nothing another task
//! writes.

use super::{QueryBlazer, TopResult};
use crate::error::{Error, Result};
use crate::fst::Fst;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::OnceLock;

#[derive(Serialize, Deserialize)]
struct PrecomputedCache {
    num_states: u64,
    topk: u64,
    results: Vec<TopResult>,
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})")
            .expect("static template is valid")
            .progress_chars("=> "),
    );
    bar.set_message(message);
    bar
}

impl QueryBlazer {
    /// Fill every model state's top-arcs and beam-search caches, in
    /// parallel across the default rayon pool.
    pub(super) fn precompute_all(&self) -> Result<()> {
        let num_states = self.model.num_states();

        let bar = progress_bar(num_states, "precomputing top arcs");
        (0..num_states).into_par_iter().try_for_each(|state| -> Result<()> {
            self.get_top_arcs(state)?;
            bar.inc(1);
            Ok(())
        })?;
        bar.finish();

        let bar = progress_bar(num_states, "precomputing top results");
        (0..num_states).into_par_iter().try_for_each(|state| -> Result<()> {
            self.get_top_result(state)?;
            bar.inc(1);
            Ok(())
        })?;
        bar.finish();

        Ok(())
    }

    /// Serialize the per-state beam-search results.
    ///
    /// Only meaningful on an instance constructed with
    /// [`Config::precompute`](super::Config::precompute) set; returns
    /// `Ok(false)` otherwise, leaving the writer untouched.
    pub fn save_precomputed<W: Write>(&self, writer: W) -> Result<bool> {
        if !self.config.precompute {
            return Ok(false);
        }

        let results: Vec<TopResult> = self
            .top_results
            .iter()
            .enumerate()
            .map(|(state, slot)| {
                slot.get().cloned().ok_or_else(|| {
                    Error::InvariantViolated(format!("state {state} missing from precomputation"))
                })
            })
            .collect::<Result<_>>()?;

        let cache = PrecomputedCache {
            num_states: results.len() as u64,
            topk: self.config.topk as u64,
            results,
        };
        bincode::serialize_into(writer, &cache)?;
        Ok(true)
    }

    /// Load per-state beam-search results saved by
    /// [`QueryBlazer::save_precomputed`].
    ///
    /// Compatibility is structural: a cache whose state count or top-k
    /// does not match the loaded model is rejected with `Ok(false)` and
    /// the engine keeps computing results lazily. Instances constructed
    /// with `precompute` set refuse to load (`Ok(false)`).
    pub fn load_precomputed<R: Read>(&mut self, reader: R) -> Result<bool> {
        if self.config.precompute {
            return Ok(false);
        }

        let cache: PrecomputedCache = bincode::deserialize_from(reader)?;
        let num_states = self.model.num_states();
        if cache.num_states != num_states as u64 || cache.topk != self.config.topk as u64 {
            return Ok(false);
        }
        if cache.results.len() != num_states {
            return Err(Error::InvariantViolated(
                "precomputed cache state count mismatch".into(),
            ));
        }

        self.top_results = cache.results.into_iter().map(OnceLock::from).collect();
        self.top_arcs = Vec::new();
        Ok(true)
    }
}
