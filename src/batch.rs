//! Corpus driver: run [`preprocess`](crate::preprocess) over many recordings.
//!
//! Recordings are independent, so they are processed in parallel with rayon.
//! A failing recording is logged with its id and failure kind, recorded in the
//! [`BatchReport`], and never stops the rest of the batch.
use anyhow::{Context, Result};
use ndarray::Array1;
use rayon::prelude::*;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::epoch::SleepEpochs;

/// One recording as delivered by a [`RecordingSource`].
#[derive(Debug, Clone)]
pub struct Recording {
    pub id: String,
    /// Single-channel waveform.
    pub signal: Array1<f32>,
    /// Sampling rate (Hz).
    pub sfreq: f64,
    /// Raw hypnogram codes, one per scoring interval.
    pub stage_codes: Vec<u32>,
}

/// Supplies recordings by id (signal reader + annotation reader).
pub trait RecordingSource: Sync {
    fn load(&self, id: &str) -> Result<Recording>;
}

/// Persists one recording's output.
pub trait RecordingSink: Sync {
    /// Output for `id` is already present; the recording is skipped.
    fn exists(&self, id: &str) -> bool;
    fn store(&self, id: &str, out: &SleepEpochs) -> Result<()>;
}

/// Why a recording produced no output.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub id: String,
    /// [`PrepError::kind`](crate::PrepError::kind) for pipeline failures, `"ReadError"` or
    /// `"WriteError"` for collaborator failures.
    pub kind: String,
    pub message: String,
}

/// Per-recording result.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written { n_epochs: usize },
    Skipped,
    Failed(Failure),
}

/// Summary of a batch run, in input order.
#[derive(Debug, Default, Clone)]
pub struct BatchReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<Failure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.written.len() + self.skipped.len() + self.failed.len()
    }
}

fn failure(id: &str, kind: &str, err: &dyn std::fmt::Display) -> Outcome {
    log::warn!("{id}: skipped ({kind}): {err}");
    Outcome::Failed(Failure {
        id: id.to_string(),
        kind: kind.to_string(),
        message: err.to_string(),
    })
}

/// Load, preprocess and store a single recording.
pub fn process_one<S, K>(id: &str, source: &S, sink: &K, cfg: &PipelineConfig) -> Outcome
where
    S: RecordingSource + ?Sized,
    K: RecordingSink + ?Sized,
{
    if sink.exists(id) {
        log::debug!("{id}: output exists, skipping");
        return Outcome::Skipped;
    }

    let rec = match source.load(id) {
        Ok(r) => r,
        Err(e) => return failure(id, "ReadError", &format!("{e:#}")),
    };

    let out = match crate::preprocess(rec.signal.view(), rec.sfreq, &rec.stage_codes, cfg) {
        Ok(o) => o,
        Err(e) => return failure(id, e.kind(), &e),
    };

    if let Err(e) = sink.store(id, &out) {
        return failure(id, "WriteError", &format!("{e:#}"));
    }
    log::info!("{id}: {} epochs × {} samples", out.n_epochs(), out.samples_per_epoch());
    Outcome::Written { n_epochs: out.n_epochs() }
}

/// Process every id; never fails as a whole.
pub fn process_batch<S, K>(ids: &[String], source: &S, sink: &K, cfg: &PipelineConfig) -> BatchReport
where
    S: RecordingSource + ?Sized,
    K: RecordingSink + ?Sized,
{
    let outcomes: Vec<Outcome> = ids
        .par_iter()
        .map(|id| process_one(id, source, sink, cfg))
        .collect();

    let mut report = BatchReport::default();
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            Outcome::Written { .. } => report.written.push(id.clone()),
            Outcome::Skipped => report.skipped.push(id.clone()),
            Outcome::Failed(f) => report.failed.push(f),
        }
    }
    log::info!(
        "batch done: {} written, {} skipped, {} failed",
        report.written.len(),
        report.skipped.len(),
        report.failed.len()
    );
    report
}

/// Read the selected-recordings list: one id per line, blank lines ignored,
/// returned sorted.
pub fn read_id_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading id list {}", path.display()))?;
    let mut ids: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    ids.sort();
    Ok(ids)
}

