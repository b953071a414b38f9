use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod analytics;
mod config;
mod roi;
mod tracking;
mod video;

use analytics::FrameOrchestrator;
use config::Config;
use roi::{RoiMode, RoiStore};
use tracking::NearestNeighbourTracker;
use video::{Display, FrameSource, HeadlessDisplay, HighguiDisplay, VideoFileSink, VideoFileSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Count and track pedestrians in a fixed-camera video")]
struct Args {
    /// Input video file
    #[arg(long)]
    video: PathBuf,

    /// How to obtain the region of interest
    #[arg(long, value_enum, default_value_t = RoiMode::Manually)]
    roi_mode: RoiMode,

    /// Config file (defaults to footfall.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without windows; manual ROI selection becomes the full frame
    #[arg(long)]
    headless: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let directive = if args.debug { "footfall=debug" } else { "footfall=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing::info!(
        video = %args.video.display(),
        roi_mode = ?args.roi_mode,
        headless = args.headless,
        "starting"
    );

    if args.headless {
        run(&args, &config, HeadlessDisplay)
    } else {
        run(&args, &config, HighguiDisplay::new())
    }
}

fn run<D: Display>(args: &Args, config: &Config, display: D) -> Result<(), Box<dyn std::error::Error>> {
    let video_path = args
        .video
        .to_str()
        .ok_or_else(|| format!("video path is not valid UTF-8: {}", args.video.display()))?;
    let source = VideoFileSource::open(video_path)?;

    let output_path = output_path_for(&args.video, &config.output.dir);
    std::fs::create_dir_all(&config.output.dir)?;
    let output_str = output_path
        .to_str()
        .ok_or_else(|| format!("output path is not valid UTF-8: {}", output_path.display()))?;
    let sink = VideoFileSink::create(output_str, source.frame_size(), &config.output)?;

    let orchestrator = FrameOrchestrator::new(
        source,
        sink,
        display,
        Box::new(NearestNeighbourTracker::new(&config.tracker)),
        RoiStore::for_video(&args.video),
        args.roi_mode,
        config,
    )?;

    let stdin = std::io::stdin();
    let summary = orchestrator.run(stdin.lock(), std::io::stdout());

    tracing::info!(
        output = %output_path.display(),
        frames = summary.frames,
        unique_tracks = summary.unique_tracks,
        "done"
    );
    Ok(())
}

fn output_path_for(video: &Path, output_dir: &str) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    Path::new(output_dir).join(format!("{stem}.avi"))
}
