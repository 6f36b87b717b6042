//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the epoching pipeline.
//! The defaults reproduce the SHHS preparation: 30 s scoring epochs and a
//! 30-minute margin around the sleep period.

use crate::error::{PrepError, Result};

/// Configuration for one pass of the epoching pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use sleepprep::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     margin_epochs: 20,   // keep 10 minutes either side
///     ..PipelineConfig::default()
/// };
/// assert_eq!(cfg.epoch_sec, 30);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Length of one scoring interval in seconds.
    ///
    /// Each hypnogram entry covers exactly this much signal.
    ///
    /// Default: `30` s.
    pub epoch_sec: u32,

    /// Number of epochs kept on each side of the scored sleep period.
    ///
    /// The window runs from `first_non_wake - margin_epochs` to
    /// `last_non_wake + margin_epochs`, clamped to the recording.
    ///
    /// Default: `60` (30 minutes of 30 s epochs).
    pub margin_epochs: usize,

    /// Channel to extract from a multi-channel recording.
    ///
    /// Matched case-insensitively with spaces ignored. When no channel matches
    /// exactly, the text before the first space is used as a type prefix
    /// (`"EEG C4-A1"` → `"EEG"`) and the first matching channel in sorted
    /// order is taken.
    ///
    /// Default: `"EEG"`.
    pub channel: String,
}

impl Default for PipelineConfig {
    /// 30 s epochs · 60-epoch margin · `EEG` channel.
    fn default() -> Self {
        Self {
            epoch_sec: 30,
            margin_epochs: 60,
            channel: "EEG".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Number of samples in one epoch at `sfreq` Hz.
    ///
    /// Fails when the product `epoch_sec × sfreq` is not a whole number of
    /// samples, since no signal length could then be split evenly.
    ///
    /// ```
    /// use sleepprep::PipelineConfig;
    /// let cfg = PipelineConfig::default();
    /// assert_eq!(cfg.samples_per_epoch(125.0).unwrap(), 3750);
    /// ```
    pub fn samples_per_epoch(&self, sfreq: f64) -> Result<usize> {
        crate::align::samples_per_epoch(sfreq, self.epoch_sec)
    }

    /// Reject configurations that can never produce an epoch.
    pub fn validate(&self) -> Result<()> {
        if self.epoch_sec == 0 {
            return Err(PrepError::EpochLength { samples_per_epoch: 0.0 });
        }
        Ok(())
    }
}
