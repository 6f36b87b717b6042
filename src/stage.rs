//! Stage-code normalisation.
//!
//! Raw hypnogram codes follow the R&K vocabulary used by the SHHS Profusion
//! exports:
//!
//! ```text
//! raw   0     1    2    3    4    5     6+
//! label 0     1    2    3    3    4     (invalid)
//!       Wake  N1   N2   N3   N4→N3 REM
//! ```
//!
//! A single out-of-vocabulary code rejects the whole recording.
use ndarray::Array1;

use crate::error::{PrepError, Result};

/// Normalised label for Wake.
pub const WAKE: i32 = 0;

/// Highest raw code with a defined mapping (REM).
pub const MAX_RAW_CODE: u32 = 5;

/// Map one raw code to its normalised label.
///
/// Returns `(label, valid)`. Codes above [`MAX_RAW_CODE`] come back unchanged
/// with `valid = false`; the caller must then discard the entire recording.
pub fn normalize(raw_code: u32) -> (i32, bool) {
    match raw_code {
        4 => (3, true),
        5 => (4, true),
        c @ 0..=3 => (c as i32, true),
        c => (c.min(i32::MAX as u32) as i32, false),
    }
}

/// Normalise a full hypnogram.
///
/// Fails with [`PrepError::InvalidStageCode`] naming the first offending
/// epoch if any code is out of vocabulary.
pub fn normalize_all(raw_codes: &[u32]) -> Result<Array1<i32>> {
    let mut labels = Vec::with_capacity(raw_codes.len());
    for (index, &code) in raw_codes.iter().enumerate() {
        let (label, valid) = normalize(code);
        if !valid {
            return Err(PrepError::InvalidStageCode { index, code });
        }
        labels.push(label);
    }
    Ok(Array1::from(labels))
}
