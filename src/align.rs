//! Signal/hypnogram alignment check.
//!
//! A recording is usable only if its sample count is an exact multiple of
//! `epoch_sec × sfreq`. Misalignment is a hard failure; nothing is padded or
//! truncated.
use crate::error::{PrepError, Result};

/// Slack allowed when deciding that `epoch_sec × sfreq` is integral.
///
/// Covers sampling rates that are not exactly representable in binary
/// floating point (e.g. `0.1 Hz × 30 s`), not genuinely fractional epochs.
const INTEGRAL_TOL: f64 = 1e-9;

/// Exact number of samples in one epoch.
pub fn samples_per_epoch(sfreq: f64, epoch_sec: u32) -> Result<usize> {
    if !sfreq.is_finite() || sfreq <= 0.0 {
        return Err(PrepError::InvalidSamplingRate(sfreq));
    }
    let exact = f64::from(epoch_sec) * sfreq;
    let rounded = exact.round();
    if rounded < 1.0 || (exact - rounded).abs() > INTEGRAL_TOL * exact.max(1.0) {
        return Err(PrepError::EpochLength { samples_per_epoch: exact });
    }
    Ok(rounded as usize)
}

/// Validate that `signal_len` samples split into whole epochs.
///
/// Returns the epoch count `signal_len / samples_per_epoch` on success.
///
/// ```
/// use sleepprep::align::validate;
/// assert_eq!(validate(2700, 1.0, 30).unwrap(), 90);
/// assert!(validate(2699, 1.0, 30).is_err());
/// ```
pub fn validate(signal_len: usize, sfreq: f64, epoch_sec: u32) -> Result<usize> {
    epoch_count(signal_len, samples_per_epoch(sfreq, epoch_sec)?)
}

/// Whole epochs in `signal_len` samples, for an already validated epoch length.
pub fn epoch_count(signal_len: usize, spe: usize) -> Result<usize> {
    if spe == 0 {
        return Err(PrepError::EpochLength { samples_per_epoch: 0.0 });
    }
    if signal_len % spe != 0 {
        return Err(PrepError::Alignment {
            n_samples: signal_len,
            samples_per_epoch: spe as f64,
        });
    }
    Ok(signal_len / spe)
}
