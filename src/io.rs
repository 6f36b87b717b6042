//! Safetensors I/O at the collaborator boundary.
//!
//! Reader: parses a per-recording input file `<id>.safetensors` holding the
//! exported PSG channels and the scored hypnogram:
//!
//! ```text
//! data      F32      [C, T]   channel waveforms, original sample rate
//! sfreq     F32|F64  [1]      sampling rate (Hz)
//! stages    I32|I64  [N]      raw stage codes, one per 30 s interval
//! ch_names  U8       [bytes]  newline-separated channel names (optional)
//! ```
//!
//! Writers: one output file per recording (`x`, `y`, `fs`) and an aggregated
//! dataset built from a directory of outputs.
use anyhow::{bail, ensure, Context, Result};
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::batch::{Recording, RecordingSink, RecordingSource};
use crate::epoch::SleepEpochs;

// ── Low-level safetensors parser (raw bytes → ndarray, no tensor types) ───────

struct StFile {
    bytes: Vec<u8>,
    header: HashMap<String, serde_json::Value>,
    data_start: usize,
}

impl StFile {
    fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading {}", path.display()))?;
        ensure!(bytes.len() >= 8, "{}: safetensors file too small", path.display());
        let n = usize::try_from(u64::from_le_bytes(bytes[..8].try_into()?))
            .with_context(|| format!("{}: header length does not fit in memory", path.display()))?;
        let data_start = 8usize
            .checked_add(n)
            .filter(|&end| end <= bytes.len())
            .with_context(|| format!("{}: truncated safetensors header", path.display()))?;
        let header: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..data_start])
                .with_context(|| format!("{}: failed to parse safetensors header", path.display()))?;
        Ok(Self { bytes, header, data_start })
    }

    fn entry(&self, name: &str) -> Result<&serde_json::Value> {
        self.header.get(name).with_context(|| format!("missing '{name}' key"))
    }

    fn dtype(&self, name: &str) -> Result<&str> {
        self.entry(name)?["dtype"]
            .as_str()
            .with_context(|| format!("'{name}': missing dtype"))
    }

    fn shape(&self, name: &str) -> Result<Vec<usize>> {
        self.entry(name)?["shape"]
            .as_array()
            .with_context(|| format!("'{name}': missing shape"))?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize).context("non-integer dimension"))
            .collect()
    }

    fn raw(&self, name: &str) -> Result<&[u8]> {
        let offsets = self.entry(name)?["data_offsets"]
            .as_array()
            .with_context(|| format!("'{name}': missing data_offsets"))?;
        ensure!(offsets.len() == 2, "'{name}': malformed data_offsets");
        let abs = |v: &serde_json::Value| {
            v.as_u64()
                .and_then(|o| usize::try_from(o).ok())
                .and_then(|o| self.data_start.checked_add(o))
                .filter(|&o| o <= self.bytes.len())
        };
        let (Some(s), Some(e)) = (abs(&offsets[0]), abs(&offsets[1])) else {
            bail!("'{name}': data_offsets out of bounds");
        };
        ensure!(s <= e, "'{name}': data_offsets out of order");
        Ok(&self.bytes[s..e])
    }

    fn f32s(&self, name: &str) -> Result<Vec<f32>> {
        let dtype = self.dtype(name)?;
        ensure!(dtype == "F32", "'{name}': expected F32, found {dtype}");
        Ok(self.raw(name)?
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn i64s(&self, name: &str) -> Result<Vec<i64>> {
        let raw = self.raw(name)?;
        Ok(match self.dtype(name)? {
            "I32" => raw.chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
                .collect(),
            "I64" => raw.chunks_exact(8)
                .map(|b| i64::from_le_bytes(b.try_into().unwrap_or([0; 8])))
                .collect(),
            other => bail!("'{name}': expected I32 or I64, found {other}"),
        })
    }

    fn scalar_f64(&self, name: &str) -> Result<f64> {
        let raw = self.raw(name)?;
        let (dtype, width) = match self.dtype(name)? {
            "F32" => ("F32", 4),
            "F64" => ("F64", 8),
            other => bail!("'{name}': expected an F32 or F64 scalar, found {other}"),
        };
        ensure!(
            raw.len() >= width,
            "'{name}': {dtype} scalar needs {width} bytes, found {}",
            raw.len()
        );
        Ok(if width == 4 {
            f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64
        } else {
            f64::from_le_bytes(raw[..8].try_into()?)
        })
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get("__metadata__")?.get(key)?.as_str()
    }
}

// ── Channel selection ─────────────────────────────────────────────────────────

fn norm_name(s: &str) -> String {
    s.replace(' ', "").to_lowercase()
}

/// Pick the channel to epoch from `ch_names`.
///
/// 1. A name equal to `wanted` (case-insensitive, spaces ignored) wins.
/// 2. Otherwise the channels containing `wanted`'s type prefix (text before
///    the first space, e.g. `"EEG"` for `"EEG C4-A1"`) are sorted by name and
///    the first is taken. SHHS exports `EEG` and `EEG(sec)`; this yields `EEG`.
/// 3. Otherwise a single-channel recording uses its only channel.
///
/// Returns the channel index and whether the match was exact.
pub fn select_channel(ch_names: &[String], n_chan: usize, wanted: &str) -> Option<(usize, bool)> {
    let target = norm_name(wanted);
    if let Some(idx) = ch_names.iter().position(|n| norm_name(n) == target) {
        return Some((idx, true));
    }

    let prefix = norm_name(wanted.split(' ').next().unwrap_or(wanted));
    let mut candidates: Vec<(usize, &String)> = ch_names
        .iter()
        .enumerate()
        .filter(|(_, n)| !prefix.is_empty() && norm_name(n).contains(&prefix))
        .collect();
    candidates.sort_by(|a, b| a.1.cmp(b.1));
    if let Some(&(idx, _)) = candidates.first() {
        return Some((idx, false));
    }

    (n_chan == 1).then_some((0, false))
}

// ── Input recording ───────────────────────────────────────────────────────────

/// One input recording loaded from `<id>.safetensors`.
pub struct RawRecording {
    /// [C, T] waveforms at `sfreq`.
    pub data: Array2<f32>,
    /// Sampling rate (Hz).
    pub sfreq: f64,
    /// Raw hypnogram codes in recording order.
    pub stages: Vec<u32>,
    /// Channel names (may be empty if not saved).
    pub ch_names: Vec<String>,
}

impl RawRecording {
    pub fn load(path: &Path) -> Result<Self> {
        let st = StFile::open(path)?;

        let data_shape = st.shape("data")?;
        ensure!(data_shape.len() == 2, "'data' must be [C, T], got {data_shape:?}");
        let data = Array2::from_shape_vec((data_shape[0], data_shape[1]), st.f32s("data")?)?;

        let sfreq = st.scalar_f64("sfreq")?;

        let stages = st.i64s("stages")?
            .into_iter()
            .enumerate()
            .map(|(i, c)| u32::try_from(c).with_context(|| format!("negative stage code {c} at epoch {i}")))
            .collect::<Result<Vec<u32>>>()?;

        // Channel names are optional.
        let ch_names = if st.header.contains_key("ch_names") {
            std::str::from_utf8(st.raw("ch_names")?)?
                .split('\n')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        } else {
            vec![]
        };
        ensure!(
            ch_names.is_empty() || ch_names.len() == data.nrows(),
            "{} channel names for {} channels",
            ch_names.len(),
            data.nrows()
        );

        Ok(RawRecording { data, sfreq, stages, ch_names })
    }

    /// Extract the channel chosen by [`select_channel`] as a 1-D signal.
    pub fn channel(&self, wanted: &str) -> Result<Array1<f32>> {
        let (idx, exact) = select_channel(&self.ch_names, self.data.nrows(), wanted)
            .with_context(|| format!("no channel matching '{wanted}' in {:?}", self.ch_names))?;
        if !exact && !self.ch_names.is_empty() {
            log::warn!(
                "channel '{wanted}' not found exactly; using '{}' from {:?}",
                self.ch_names[idx],
                self.ch_names
            );
        }
        Ok(self.data.row(idx).to_owned())
    }
}

// ── Generic safetensors builder ───────────────────────────────────────────────

/// Simple safetensors file writer that handles F32, F64, and I32 tensors.
///
/// Usage:
/// ```rust,no_run
/// use sleepprep::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f32("x", &[1.0f32, 2.0, 3.0], &[1, 3]);
/// w.add_i32("y", &[2], &[1]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f32_arr2(&mut self, name: &str, arr: ArrayView2<f32>) {
        let data: Vec<f32> = arr.iter().copied().collect();
        self.add_f32(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn add_bytes(&mut self, name: &str, data: &[u8]) {
        self.entries.push((name.to_string(), data.to_vec(), "U8", vec![data.len()]));
    }

    /// String entry for the `__metadata__` header map.
    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header_map.insert("__metadata__".into(), serde_json::json!(self.metadata));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        // Write beside the target and rename, so a failed or interrupted
        // write never leaves a truncated file under the final name.
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let written = (|| -> Result<()> {
            let mut f = std::fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(&(padded.len() as u64).to_le_bytes())?;
            f.write_all(&padded)?;
            for (_, data, _, _) in &self.entries {
                f.write_all(data)?;
            }
            f.sync_all()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} → {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

// ── Per-recording output ──────────────────────────────────────────────────────

/// Write one recording's windowed epochs.
///
/// Keys: `x` F32 `[E, S]`, `y` I32 `[E]`, `fs` F64 `[1]`.
pub fn write_recording(path: &Path, out: &SleepEpochs) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f32_arr2("x", out.epochs.view());
    w.add_i32("y", &out.labels.to_vec(), &[out.n_epochs()]);
    w.add_f64("fs", &[out.sfreq], &[1]);
    w.write(path)
}

/// Read back a file written by [`write_recording`].
pub fn read_recording(path: &Path) -> Result<SleepEpochs> {
    let st = StFile::open(path)?;
    let x_shape = st.shape("x")?;
    ensure!(x_shape.len() == 2, "'x' must be [E, S], got {x_shape:?}");
    let epochs = Array2::from_shape_vec((x_shape[0], x_shape[1]), st.f32s("x")?)?;
    let labels = st.i64s("y")?
        .into_iter()
        .map(|v| i32::try_from(v).context("label out of range"))
        .collect::<Result<Array1<i32>>>()?;
    ensure!(
        labels.len() == epochs.nrows(),
        "{}: {} epochs but {} labels",
        path.display(),
        epochs.nrows(),
        labels.len()
    );
    let sfreq = st.scalar_f64("fs")?;
    Ok(SleepEpochs { epochs, labels, sfreq })
}

// ── Dataset writer ────────────────────────────────────────────────────────────

/// Concatenate per-recording outputs into one dataset file.
///
/// Inputs are taken in sorted path order. Keys: `x` F32 `[ΣE, S]`,
/// `y` I32 `[ΣE]`, `fs` F64 `[1]`, `record_offsets` I32 `[R + 1]`
/// (recording `r` owns rows `offsets[r]..offsets[r + 1]`), and the record
/// names, newline-separated, under `__metadata__["records"]`.
///
/// All recordings must share `fs` and samples-per-epoch.
/// Returns the total number of epochs written.
pub fn write_dataset(inputs: &[PathBuf], path: &Path) -> Result<usize> {
    ensure!(!inputs.is_empty(), "no recordings to aggregate");
    let target = canonical(path);
    if let Some(p) = inputs.iter().find(|p| canonical(p) == target) {
        bail!("{} is both the dataset and one of its inputs", p.display());
    }
    let mut sorted = inputs.to_vec();
    sorted.sort();

    let mut parts = Vec::with_capacity(sorted.len());
    for p in &sorted {
        parts.push(read_recording(p)?);
    }

    let (fs, spe) = (parts[0].sfreq, parts[0].samples_per_epoch());
    let mut offsets = vec![0_i32];
    for (p, part) in sorted.iter().zip(&parts) {
        ensure!(
            part.sfreq == fs && part.samples_per_epoch() == spe,
            "{}: fs={} S={} differs from fs={fs} S={spe}",
            p.display(),
            part.sfreq,
            part.samples_per_epoch()
        );
        let last = *offsets.last().unwrap_or(&0);
        offsets.push(last + i32::try_from(part.n_epochs())?);
    }

    let x = concatenate(Axis(0), &parts.iter().map(|p| p.epochs.view()).collect::<Vec<_>>())?;
    let y: Vec<i32> = parts.iter().flat_map(|p| p.labels.iter().copied()).collect();

    let names: Vec<String> = sorted
        .iter()
        .map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default())
        .collect();

    let mut w = StWriter::new();
    w.set_metadata("records", names.join("\n"));
    w.add_f32_arr2("x", x.view());
    w.add_i32("y", &y, &[y.len()]);
    w.add_f64("fs", &[fs], &[1]);
    w.add_i32("record_offsets", &offsets, &[offsets.len()]);
    w.write(path)?;
    Ok(y.len())
}

/// Read a dataset written by [`write_dataset`]: the concatenated epochs and
/// the per-recording row offsets.
pub fn read_dataset(path: &Path) -> Result<(SleepEpochs, Vec<usize>, Vec<String>)> {
    let all = read_recording(path)?;
    let st = StFile::open(path)?;
    let offsets = st.i64s("record_offsets")?
        .into_iter()
        .map(|v| usize::try_from(v).context("negative record offset"))
        .collect::<Result<Vec<usize>>>()?;
    let names = st.metadata("records")
        .map(|s| s.split('\n').map(String::from).collect())
        .unwrap_or_default();
    Ok((all, offsets, names))
}

// ── Directory-backed collaborators ────────────────────────────────────────────

/// Reads `<dir>/<id>.safetensors` and extracts the configured channel.
pub struct SafetensorsSource {
    pub dir: PathBuf,
    pub channel: String,
}

impl RecordingSource for SafetensorsSource {
    fn load(&self, id: &str) -> Result<Recording> {
        let raw = RawRecording::load(&self.dir.join(format!("{id}.safetensors")))?;
        let signal = raw.channel(&self.channel)?;
        log::debug!(
            "{id}: {} samples @ {} Hz, {} stage codes",
            signal.len(),
            raw.sfreq,
            raw.stages.len()
        );
        Ok(Recording {
            id: id.to_string(),
            signal,
            sfreq: raw.sfreq,
            stage_codes: raw.stages,
        })
    }
}

/// Writes `<dir>/<id>.safetensors` via [`write_recording`].
pub struct SafetensorsSink {
    pub dir: PathBuf,
}

impl SafetensorsSink {
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.safetensors"))
    }

    /// All output files currently in the directory.
    pub fn outputs(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "safetensors") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// [`outputs`](Self::outputs) without `exclude`, compared after
    /// canonicalisation so `./out/all.safetensors` matches `out/all.safetensors`.
    pub fn outputs_except(&self, exclude: &Path) -> Result<Vec<PathBuf>> {
        let exclude = canonical(exclude);
        Ok(self.outputs()?
            .into_iter()
            .filter(|p| canonical(p) != exclude)
            .collect())
    }
}

/// Canonical form of `path`, resolving through the parent directory when the
/// file itself does not exist yet.
fn canonical(path: &Path) -> PathBuf {
    if let Ok(c) = path.canonicalize() {
        return c;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
            parent
                .canonicalize()
                .map(|d| d.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// `true` when `path` holds a whole safetensors file: the header parses and
/// every tensor's data ends inside the file. Only the header is read.
pub fn is_complete(path: &Path) -> bool {
    fn check(path: &Path) -> Result<()> {
        use std::io::Read;
        let mut f = std::fs::File::open(path)?;
        let len = f.metadata()?.len();
        let mut head = [0u8; 8];
        f.read_exact(&mut head)?;
        let n = u64::from_le_bytes(head);
        let data_start = 8u64
            .checked_add(n)
            .filter(|&end| end <= len)
            .context("truncated header")?;
        let mut hdr = vec![0u8; usize::try_from(n)?];
        f.read_exact(&mut hdr)?;
        let header: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&hdr)?;
        for (key, entry) in &header {
            if key == "__metadata__" { continue; }
            let end = entry["data_offsets"][1]
                .as_u64()
                .with_context(|| format!("'{key}': missing data_offsets"))?;
            ensure!(
                data_start.checked_add(end).is_some_and(|e| e <= len),
                "'{key}': data past end of file"
            );
        }
        Ok(())
    }
    check(path).is_ok()
}

impl RecordingSink for SafetensorsSink {
    /// Only a complete output counts; a truncated one is rewritten.
    fn exists(&self, id: &str) -> bool {
        let path = self.path_for(id);
        if !path.exists() {
            return false;
        }
        let complete = is_complete(&path);
        if !complete {
            log::warn!("{id}: existing output {} is incomplete, rewriting", path.display());
        }
        complete
    }

    fn store(&self, id: &str, out: &SleepEpochs) -> Result<()> {
        write_recording(&self.path_for(id), out)
    }
}
