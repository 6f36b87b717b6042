mod common;
use common::{codes, ramp_signal, scratch_dir};
use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use sleepprep::{
    process_batch, process_one, read_id_list, Outcome, PipelineConfig, Recording, RecordingSink,
    RecordingSource, SleepEpochs,
};

struct MemSource(HashMap<String, Recording>);

impl RecordingSource for MemSource {
    fn load(&self, id: &str) -> Result<Recording> {
        self.0.get(id).cloned().ok_or_else(|| anyhow!("no such recording"))
    }
}

#[derive(Default)]
struct MemSink(Mutex<HashMap<String, SleepEpochs>>);

impl RecordingSink for MemSink {
    fn exists(&self, id: &str) -> bool {
        self.0.lock().unwrap().contains_key(id)
    }
    fn store(&self, id: &str, out: &SleepEpochs) -> Result<()> {
        self.0.lock().unwrap().insert(id.to_string(), out.clone());
        Ok(())
    }
}

fn rec(id: &str, n_samples: usize, stage_codes: Vec<u32>) -> (String, Recording) {
    (
        id.to_string(),
        Recording { id: id.to_string(), signal: ramp_signal(n_samples), sfreq: 1.0, stage_codes },
    )
}

fn corpus() -> MemSource {
    let good = codes(&[(0, 40), (2, 10), (0, 40)]);
    let mut bad_code = good.clone();
    bad_code[3] = 7;
    MemSource(HashMap::from([
        rec("a-good", 2700, good.clone()),
        rec("b-badcode", 2700, bad_code),
        rec("c-misaligned", 2699, good.clone()),
        rec("d-short-hypno", 2700, codes(&[(2, 80)])),
        rec("e-awake", 2700, codes(&[(0, 90)])),
        rec("f-good", 2700, good),
    ]))
}

fn ids() -> Vec<String> {
    ["a-good", "b-badcode", "c-misaligned", "d-short-hypno", "e-awake", "f-good", "g-missing"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[test]
fn bad_recordings_do_not_stop_the_batch() {
    let source = corpus();
    let sink = MemSink::default();
    let cfg = PipelineConfig { margin_epochs: 5, ..PipelineConfig::default() };

    let report = process_batch(&ids(), &source, &sink, &cfg);
    assert_eq!(report.written, vec!["a-good", "f-good"]);
    assert_eq!(report.total(), 7);

    let kinds: Vec<(&str, &str)> = report
        .failed
        .iter()
        .map(|f| (f.id.as_str(), f.kind.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("b-badcode", "InvalidStageCode"),
            ("c-misaligned", "AlignmentError"),
            ("d-short-hypno", "CountMismatch"),
            ("e-awake", "EmptySleepWindow"),
            ("g-missing", "ReadError"),
        ]
    );

    let stored = sink.0.lock().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored["a-good"].n_epochs(), 20);
}

#[test]
fn existing_outputs_are_skipped() {
    let source = corpus();
    let sink = MemSink::default();
    let cfg = PipelineConfig { margin_epochs: 5, ..PipelineConfig::default() };

    assert_eq!(
        process_one("a-good", &source, &sink, &cfg),
        Outcome::Written { n_epochs: 20 }
    );
    assert_eq!(process_one("a-good", &source, &sink, &cfg), Outcome::Skipped);

    let report = process_batch(&ids(), &source, &sink, &cfg);
    assert_eq!(report.skipped, vec!["a-good"]);
    assert_eq!(report.written, vec!["f-good"]);
}

#[test]
fn id_list_is_trimmed_and_sorted() {
    let dir = scratch_dir("ids");
    let path = dir.join("selected_shhs1_files.txt");
    std::fs::write(&path, "shhs1-200003\n\n  shhs1-200001 \nshhs1-200002\n").unwrap();
    assert_eq!(
        read_id_list(&path).unwrap(),
        vec!["shhs1-200001", "shhs1-200002", "shhs1-200003"]
    );
}
