//! Sleep-period window selection.
//!
//! Keeps the span from the first to the last non-Wake epoch, widened by a
//! fixed margin on both sides and clamped to the recording:
//!
//! ```text
//! start = max(0,     first_non_wake − margin)
//! end   = min(E − 1, last_non_wake  + margin)
//! ```
//!
//! Bounds are inclusive. An all-Wake hypnogram has no sleep period and is
//! rejected with [`PrepError::EmptySleepWindow`].
use ndarray::ArrayView1;

use crate::error::{PrepError, Result};
use crate::stage::WAKE;

/// Inclusive `(start, end)` epoch range covering the sleep period plus `margin_epochs`.
pub fn select_window(labels: ArrayView1<i32>, margin_epochs: usize) -> Result<(usize, usize)> {
    let n = labels.len();
    let first = labels.iter().position(|&l| l != WAKE);
    let last = labels.iter().rposition(|&l| l != WAKE);
    let (Some(first), Some(last)) = (first, last) else {
        return Err(PrepError::EmptySleepWindow { n_epochs: n });
    };

    let start = first.saturating_sub(margin_epochs);
    let end = last.saturating_add(margin_epochs).min(n - 1);
    Ok((start, end))
}
