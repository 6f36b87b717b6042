//! Recording-level failures of the epoching pipeline.
//!
//! Every variant is fatal to the recording it came from and to nothing else:
//! the batch driver logs it against the recording id and moves on.
use thiserror::Error;

/// Result alias for the core pipeline.
pub type Result<T> = std::result::Result<T, PrepError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PrepError {
    /// A raw stage code outside `0..=5`. Invalidates the whole hypnogram.
    #[error("stage code {code} at epoch {index} is outside 0..=5")]
    InvalidStageCode { index: usize, code: u32 },

    /// Signal length is not a whole number of epochs.
    #[error("{n_samples} samples is not a multiple of {samples_per_epoch} samples per epoch")]
    Alignment { n_samples: usize, samples_per_epoch: f64 },

    /// `epoch_sec × sfreq` is not a positive whole number of samples.
    #[error("epoch length of {samples_per_epoch} samples is not a positive whole number")]
    EpochLength { samples_per_epoch: f64 },

    #[error("sampling rate must be positive and finite, got {0}")]
    InvalidSamplingRate(f64),

    /// Signal-derived epoch count disagrees with the hypnogram length.
    #[error("signal holds {epochs} epochs but hypnogram has {labels} labels")]
    CountMismatch { epochs: usize, labels: usize },

    /// Every epoch is scored Wake, so there is no sleep period to keep.
    #[error("no non-wake epoch among {n_epochs}")]
    EmptySleepWindow { n_epochs: usize },
}

impl PrepError {
    /// Short stable name used in diagnostics and batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PrepError::InvalidStageCode { .. } => "InvalidStageCode",
            PrepError::Alignment { .. }
            | PrepError::EpochLength { .. }
            | PrepError::InvalidSamplingRate(_) => "AlignmentError",
            PrepError::CountMismatch { .. } => "CountMismatch",
            PrepError::EmptySleepWindow { .. } => "EmptySleepWindow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_rate_reports_as_alignment() {
        assert_eq!(PrepError::InvalidSamplingRate(0.0).kind(), "AlignmentError");
    }

    #[test]
    fn message_names_the_code() {
        let e = PrepError::InvalidStageCode { index: 12, code: 7 };
        assert_eq!(e.to_string(), "stage code 7 at epoch 12 is outside 0..=5");
        assert_eq!(e.kind(), "InvalidStageCode");
    }
}
