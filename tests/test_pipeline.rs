mod common;
use common::{codes, ramp_signal};
use ndarray::Array1;
use sleepprep::{epoch_recording, preprocess, PipelineConfig, PrepError};

fn cfg(margin_epochs: usize) -> PipelineConfig {
    PipelineConfig { margin_epochs, ..PipelineConfig::default() }
}

#[test]
fn sleep_window_scenario() {
    // 2700 samples @ 1 Hz → 90 epochs of 30 samples.
    let signal = ramp_signal(2700);
    let y = codes(&[(0, 40), (2, 10), (0, 40)]);

    let out = preprocess(signal.view(), 1.0, &y, &cfg(5)).unwrap();
    assert_eq!(out.n_epochs(), 20);
    assert_eq!(out.epochs.dim(), (20, 30));
    assert_eq!(out.sfreq, 1.0);

    // First kept epoch is epoch 35 of the recording.
    assert_eq!(out.epochs[[0, 0]], signal[35 * 30]);
    assert_eq!(out.epochs[[19, 29]], signal[54 * 30 + 29]);
    assert_eq!(&out.labels.to_vec()[5..15], &[2; 10]);
}

#[test]
fn labels_are_normalised() {
    let signal = ramp_signal(6 * 30);
    let y = vec![0, 1, 2, 3, 4, 5];
    let out = preprocess(signal.view(), 1.0, &y, &cfg(0)).unwrap();
    assert_eq!(out.labels.to_vec(), vec![1, 2, 3, 3, 4]);
}

#[test]
fn invalid_code_anywhere_rejects() {
    let signal = ramp_signal(2700);
    let mut y = codes(&[(0, 40), (2, 10), (0, 40)]);
    y[77] = 7;
    let err = preprocess(signal.view(), 1.0, &y, &cfg(5)).unwrap_err();
    assert_eq!(err, PrepError::InvalidStageCode { index: 77, code: 7 });
    assert_eq!(err.kind(), "InvalidStageCode");
}

#[test]
fn misaligned_signal_rejects() {
    let signal = ramp_signal(2699);
    let y = codes(&[(2, 90)]);
    let err = preprocess(signal.view(), 1.0, &y, &cfg(5)).unwrap_err();
    assert_eq!(err.kind(), "AlignmentError");
}

#[test]
fn hypnogram_length_must_match() {
    let signal = ramp_signal(2700);
    let y = codes(&[(2, 89)]);
    assert_eq!(
        preprocess(signal.view(), 1.0, &y, &cfg(5)).unwrap_err(),
        PrepError::CountMismatch { epochs: 90, labels: 89 }
    );
}

#[test]
fn all_wake_rejects() {
    let signal = ramp_signal(2700);
    let y = codes(&[(0, 90)]);
    assert_eq!(
        preprocess(signal.view(), 1.0, &y, &cfg(5)).unwrap_err(),
        PrepError::EmptySleepWindow { n_epochs: 90 }
    );
}

#[test]
fn stage_codes_checked_before_alignment() {
    let signal = ramp_signal(2699);
    let y = vec![9; 90];
    assert!(matches!(
        preprocess(signal.view(), 1.0, &y, &cfg(5)),
        Err(PrepError::InvalidStageCode { .. })
    ));
}

#[test]
fn epochs_reconstruct_signal() {
    let signal = ramp_signal(125 * 30 * 12);
    let y = codes(&[(0, 3), (1, 4), (5, 5)]);
    let all = epoch_recording(signal.view(), 125.0, &y, &PipelineConfig::default()).unwrap();
    assert_eq!(all.epochs.dim(), (12, 3750));
    let flat: Array1<f32> = all.epochs.iter().copied().collect();
    assert_eq!(flat, signal);
}

#[test]
fn rerun_is_identical() {
    let signal = ramp_signal(125 * 30 * 200);
    let y = codes(&[(0, 80), (2, 30), (5, 10), (3, 20), (0, 60)]);
    let a = preprocess(signal.view(), 125.0, &y, &PipelineConfig::default()).unwrap();
    let b = preprocess(signal.view(), 125.0, &y, &PipelineConfig::default()).unwrap();
    assert_eq!(a, b);
    // 60-epoch default margin: 80 − 60 = 20 … 139 + 60 = 199 (clamped).
    assert_eq!(a.n_epochs(), 180);
}

#[test]
fn window_clamps_at_both_ends() {
    let signal = ramp_signal(10 * 30);
    let y = codes(&[(2, 1), (0, 8), (5, 1)]);
    let out = preprocess(signal.view(), 1.0, &y, &cfg(60)).unwrap();
    assert_eq!(out.n_epochs(), 10);
    assert_eq!(out.labels[0], 2);
    assert_eq!(out.labels[9], 4);
}
