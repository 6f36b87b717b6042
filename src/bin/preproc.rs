use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use sleepprep::{
    io::{write_dataset, SafetensorsSink, SafetensorsSource},
    process_batch, read_id_list, PipelineConfig,
};

#[derive(Parser)]
#[command(name = "preproc", about = "Sleep-stage epoching for PSG recordings")]
struct Args {
    /// Directory of <id>.safetensors input recordings
    #[arg(long)]
    data_dir: PathBuf,

    /// Directory for per-recording outputs (created if missing)
    #[arg(long)]
    out_dir: PathBuf,

    /// File listing the recording ids to process, one per line
    #[arg(long)]
    ids: PathBuf,

    /// Channel to extract (default: EEG)
    #[arg(long, default_value = "EEG")]
    channel: String,

    /// Scoring epoch length in seconds (default: 30)
    #[arg(long, default_value_t = 30)]
    epoch_sec: u32,

    /// Epochs kept either side of the sleep period (default: 60)
    #[arg(long, default_value_t = 60)]
    margin_epochs: usize,

    /// Aggregate all outputs into this dataset file when done
    #[arg(long)]
    dataset: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = PipelineConfig {
        epoch_sec: args.epoch_sec,
        margin_epochs: args.margin_epochs,
        channel: args.channel,
    };
    cfg.validate()?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let ids = read_id_list(&args.ids)?;
    log::info!("{} recordings listed in {}", ids.len(), args.ids.display());

    let source = SafetensorsSource { dir: args.data_dir, channel: cfg.channel.clone() };
    let sink = SafetensorsSink { dir: args.out_dir };
    let report = process_batch(&ids, &source, &sink, &cfg);

    for f in &report.failed {
        eprintln!("{}: {} ({})", f.id, f.kind, f.message);
    }
    println!(
        "{} written, {} already present, {} failed",
        report.written.len(),
        report.skipped.len(),
        report.failed.len()
    );

    if let Some(dataset) = args.dataset {
        let outputs = sink.outputs_except(&dataset)?;
        let n = write_dataset(&outputs, &dataset)?;
        println!("Dataset: {} recordings, {n} epochs → {}", outputs.len(), dataset.display());
    }

    Ok(())
}
