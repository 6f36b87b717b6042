//! Fixed-length epoching.
//!
//! Splits a continuous single-channel signal `[T]` into non-overlapping
//! windows of `samples_per_epoch` samples, `[E, samples_per_epoch]`, and pairs
//! row `e` with hypnogram entry `e`. `T` must equal `E × samples_per_epoch`.
use ndarray::{s, Array1, Array2, ArrayView1};

use crate::error::{PrepError, Result};

/// Labeled epochs of one recording: the pipeline's output triple.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepEpochs {
    /// `[E, samples_per_epoch]` signal, one row per epoch.
    pub epochs: Array2<f32>,
    /// `[E]` normalised stage labels in `0..=4`.
    pub labels: Array1<i32>,
    /// Sampling rate of `epochs` in Hz.
    pub sfreq: f64,
}

impl SleepEpochs {
    /// Number of epochs.
    pub fn n_epochs(&self) -> usize {
        self.labels.len()
    }

    /// Samples in each epoch row.
    pub fn samples_per_epoch(&self) -> usize {
        self.epochs.ncols()
    }

    /// Keep epochs `start..=end` of both arrays.
    ///
    /// # Panics
    /// If `start > end` or `end >= n_epochs()`.
    pub fn select(&self, start: usize, end: usize) -> SleepEpochs {
        assert!(start <= end && end < self.n_epochs(), "window {start}..={end} out of range");
        SleepEpochs {
            epochs: self.epochs.slice(s![start..=end, ..]).to_owned(),
            labels: self.labels.slice(s![start..=end]).to_owned(),
            sfreq: self.sfreq,
        }
    }
}

/// Split `signal` into `epoch_count` consecutive rows of `samples_per_epoch`.
///
/// Concatenating the rows in order gives back `signal` exactly.
pub fn segment(
    signal: ArrayView1<f32>,
    samples_per_epoch: usize,
    epoch_count: usize,
) -> Result<Array2<f32>> {
    if signal.len() != samples_per_epoch * epoch_count {
        return Err(PrepError::Alignment {
            n_samples: signal.len(),
            samples_per_epoch: samples_per_epoch as f64,
        });
    }

    let mut out = Array2::<f32>::zeros((epoch_count, samples_per_epoch));
    for e in 0..epoch_count {
        let start = e * samples_per_epoch;
        out.row_mut(e)
           .assign(&signal.slice(s![start..start + samples_per_epoch]));
    }
    Ok(out)
}

/// Pair segmented epochs with their labels by position.
///
/// A count mismatch means the hypnogram does not describe this signal; it is
/// reported, never truncated away.
pub fn pair_labels(epochs: Array2<f32>, labels: Array1<i32>, sfreq: f64) -> Result<SleepEpochs> {
    if epochs.nrows() != labels.len() {
        return Err(PrepError::CountMismatch {
            epochs: epochs.nrows(),
            labels: labels.len(),
        });
    }
    Ok(SleepEpochs { epochs, labels, sfreq })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn epoch_count_and_shape() {
        let signal = Array1::from_elem(3750 * 4, 1.0_f32);
        let epochs = segment(signal.view(), 3750, 4).unwrap();
        assert_eq!(epochs.shape(), &[4, 3750]);
    }

    #[test]
    fn rows_follow_signal_order() {
        let signal = Array1::from_iter((0..12).map(|v| v as f32));
        let epochs = segment(signal.view(), 3, 4).unwrap();
        assert_eq!(epochs.row(0).to_vec(), vec![0.0, 1.0, 2.0]);
        assert_eq!(epochs.row(3).to_vec(), vec![9.0, 10.0, 11.0]);
    }

    #[test]
    fn leftover_samples_rejected() {
        let signal = Array1::from_elem(31, 0.0_f32);
        assert!(segment(signal.view(), 30, 1).is_err());
    }

    #[test]
    fn mismatched_label_count() {
        let epochs = Array2::<f32>::zeros((3, 30));
        let labels = Array1::from(vec![0, 1]);
        assert_eq!(
            pair_labels(epochs, labels, 1.0).unwrap_err(),
            PrepError::CountMismatch { epochs: 3, labels: 2 }
        );
    }

    #[test]
    fn select_is_inclusive() {
        let epochs = Array2::from_shape_fn((5, 2), |(e, _)| e as f32);
        let labels = Array1::from(vec![0, 1, 2, 3, 4]);
        let set = pair_labels(epochs, labels, 1.0).unwrap();
        let sub = set.select(1, 3);
        assert_eq!(sub.n_epochs(), 3);
        assert_eq!(sub.labels.to_vec(), vec![1, 2, 3]);
        assert_eq!(sub.epochs[[2, 0]], 3.0);
    }
}
