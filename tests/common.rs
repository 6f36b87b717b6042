/// Shared helpers for building synthetic recordings.
use ndarray::Array1;
use std::path::PathBuf;

/// Hypnogram from `(code, repeat)` runs.
pub fn codes(runs: &[(u32, usize)]) -> Vec<u32> {
    runs.iter()
        .flat_map(|&(c, n)| std::iter::repeat(c).take(n))
        .collect()
}

/// Deterministic, non-constant signal of `n` samples.
pub fn ramp_signal(n: usize) -> Array1<f32> {
    Array1::from_shape_fn(n, |t| ((t as f32) * 0.37).sin() * 40.0 + (t % 7) as f32)
}

#[allow(unused)]
/// Fresh scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("sleepprep-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
