//! Surgery Segmentation CLI - annotate surgical video with tool masks
//!
//! Decodes the input video, runs every frame through the segmentation model
//! and writes the overlaid result plus progress/stats files into the job
//! directory.

use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use surgery_seg_core::{
    normalize_job_id, Device, FileProgressReporter, ModelPrecision, OrtInferer, PipelineDriver,
    RunConfig,
};
use surgery_seg_decoder::VideoFileSource;
use surgery_seg_encoder::{EncoderConfig, VideoFileSink};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(
    name = "surgery-seg",
    version,
    about = "Segment surgical tools in a video and overlay the predicted masks",
    after_help = "EXAMPLES:\n  \
                  surgery-seg -i video.mp4\n  \
                  surgery-seg -d GPU -m FP16 -i video.mp4 -o results\n  \
                  PBS_JOBID=1234.server surgery-seg -i video.mp4  # writes to results/1234"
)]
struct Cli {
    /// Target device: CPU, GPU or COREML
    #[arg(short, long, default_value = "CPU")]
    device: String,

    /// Input video
    #[arg(short, long)]
    input: PathBuf,

    /// Model precision: FP32 or FP16
    #[arg(short = 'm', long = "model", default_value = "FP32")]
    precision: String,

    /// Root directory for results
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Directory holding one model subdirectory per precision
    #[arg(long, default_value = "models")]
    model_root: PathBuf,

    /// Batch job identifier (anything after the first '.' is dropped)
    #[arg(long, env = "PBS_JOBID")]
    job_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let device: Device = self.device.parse().context("Invalid --device")?;
        let precision: ModelPrecision = self.precision.parse().context("Invalid --model")?;

        let mut config = RunConfig::new(self.input, self.output);
        config.device = device;
        config.precision = precision;
        config.model_root = self.model_root;
        config.job_id = self.job_id.as_deref().and_then(normalize_job_id);
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = cli.into_config()?;
    config.validate()?;
    debug!("Run configuration: {:?}", config);

    let source = VideoFileSource::open(&config.input)
        .with_context(|| format!("Failed to open {}", config.input.display()))?;
    let video = source.info();
    info!(
        "Input {}: {}x{} @ {:.2} fps, {} frames",
        config.input.display(),
        video.width,
        video.height,
        video.fps,
        video.total_frames
    );

    let inferer = OrtInferer::open(&config.model_path(), config.device)?;

    let video_path = config.video_path();
    let sink = VideoFileSink::create(&video_path, EncoderConfig::default())
        .with_context(|| format!("Failed to create {}", video_path.display()))?;

    let mut driver = PipelineDriver::new(source, inferer, sink)
        .with_progress(FileProgressReporter::new(config.progress_path()))
        .with_stats_file(config.stats_path());

    let stats = driver.run()?;

    info!(
        "Wrote {} frames to {} in {:.2}s ({} fps)",
        stats.total_frames,
        video_path.display(),
        stats.total_time_seconds,
        stats.fps
    );
    info!("Stats written to {}", config.stats_path().display());
    Ok(())
}
