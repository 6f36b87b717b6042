//! # sleepprep — sleep-stage epoching for PSG recordings
//!
//! `sleepprep` turns one continuous polysomnography channel and its
//! human-scored hypnogram into fixed-length, individually labeled epochs,
//! trimmed to the sleep period. It is the preparation step for sleep-staging
//! models trained on SHHS-style data.
//!
//! ## Pipeline overview
//!
//! ```text
//! <id>.safetensors  (data [C, T], sfreq, stages [N], ch_names)
//!   │
//!   ├─ io::RawRecording::channel   pick one channel by explicit rule
//!   ├─ stage::normalize_all        R&K codes → {W, N1, N2, N3, REM}; any code > 5 rejects
//!   ├─ align::validate             T must be a whole number of 30 s epochs
//!   ├─ epoch::segment              [T] → [E, 30·sfreq]
//!   ├─ epoch::pair_labels          E must equal N
//!   └─ window::select_window       first..last non-Wake ± 60 epochs
//!        │
//!        └─→ SleepEpochs { epochs [E', S] f32, labels [E'] i32, sfreq }
//! ```
//!
//! ## Quick start
//!
//! ```
//! use sleepprep::{preprocess, PipelineConfig};
//! use ndarray::Array1;
//!
//! // 90 epochs at 1 Hz; sleep in epochs 40..50.
//! let signal = Array1::<f32>::zeros(2700);
//! let codes: Vec<u32> = [vec![0; 40], vec![2; 10], vec![0; 40]].concat();
//!
//! let cfg = PipelineConfig { margin_epochs: 5, ..PipelineConfig::default() };
//! let out = preprocess(signal.view(), 1.0, &codes, &cfg).unwrap();
//! assert_eq!(out.epochs.dim(), (20, 30));
//! ```
//!
//! ## Batch processing
//!
//! [`batch::process_batch`] runs the pipeline over a list of recording ids
//! through any [`RecordingSource`]/[`RecordingSink`] pair. A malformed
//! recording is logged and skipped; it never aborts the batch.

pub mod align;
pub mod batch;
pub mod config;
pub mod epoch;
pub mod error;
pub mod io;
pub mod stage;
pub mod window;

use log::debug;
use ndarray::ArrayView1;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::PipelineConfig;

// error
pub use error::{PrepError, Result};

// epoch
pub use epoch::{pair_labels, segment, SleepEpochs};

// stage / align / window
pub use align::{epoch_count, samples_per_epoch, validate};
pub use stage::{normalize, normalize_all, WAKE};
pub use window::select_window;

// batch
pub use batch::{
    process_batch, process_one, read_id_list,
    BatchReport, Failure, Outcome, Recording, RecordingSink, RecordingSource,
};

// io — safetensors collaborators
pub use io::{
    is_complete, read_dataset, read_recording, select_channel, write_dataset, write_recording,
    RawRecording, SafetensorsSink, SafetensorsSource, StWriter,
};

/// Normalise, validate and segment one recording, without window selection.
///
/// Every epoch of the recording is returned, paired with its label.
/// Concatenating the rows of `epochs` reproduces `signal` exactly.
///
/// # Errors
///
/// * [`PrepError::InvalidStageCode`] if any raw code exceeds 5.
/// * [`PrepError::InvalidSamplingRate`] / [`PrepError::EpochLength`] if
///   `epoch_sec × sfreq` is not a positive whole number of samples.
/// * [`PrepError::Alignment`] if the signal is not a whole number of epochs.
/// * [`PrepError::CountMismatch`] if the epoch count differs from the
///   number of stage codes.
pub fn epoch_recording(
    signal: ArrayView1<f32>,
    sfreq: f64,
    stage_codes: &[u32],
    cfg: &PipelineConfig,
) -> Result<SleepEpochs> {
    cfg.validate()?;

    // 1. Normalise the hypnogram; one bad code rejects the recording.
    let labels = stage::normalize_all(stage_codes)?;

    // 2. Check the signal splits into whole epochs.
    let spe = cfg.samples_per_epoch(sfreq)?;
    let n_epochs = align::epoch_count(signal.len(), spe)?;

    // 3. Segment and pair with labels.
    let epochs = epoch::segment(signal, spe, n_epochs)?;
    epoch::pair_labels(epochs, labels, sfreq)
}

/// Run the **full epoching pipeline** on a single recording.
///
/// Chains [`epoch_recording`] with [`select_window`] and slices epochs and
/// labels by the same inclusive range, so pairing is preserved.
///
/// # Arguments
///
/// * `signal`      – One channel, shape `[T]`.
/// * `sfreq`       – Sampling rate of `signal` in Hz.
/// * `stage_codes` – Raw hypnogram, one code per `cfg.epoch_sec` interval.
/// * `cfg`         – Pipeline configuration (see [`PipelineConfig`]).
///
/// # Errors
///
/// Everything [`epoch_recording`] returns, plus
/// [`PrepError::EmptySleepWindow`] when every epoch is scored Wake.
///
/// The output is a pure function of the inputs: running it twice yields
/// identical arrays.
pub fn preprocess(
    signal: ArrayView1<f32>,
    sfreq: f64,
    stage_codes: &[u32],
    cfg: &PipelineConfig,
) -> Result<SleepEpochs> {
    let all = epoch_recording(signal, sfreq, stage_codes, cfg)?;

    // 4. Keep the sleep period plus margin.
    let (start, end) = window::select_window(all.labels.view(), cfg.margin_epochs)?;
    debug!("data before selection: {:?}, {:?}", all.epochs.dim(), all.labels.dim());
    let out = all.select(start, end);
    debug!("data after selection: {:?}, {:?}", out.epochs.dim(), out.labels.dim());

    Ok(out)
}
