//! One-shot inspection from the command line.
//!
//! Loads the reference library, ingests the given images and/or video,
//! generates a report, writes it to the report path and prints a summary.
//! Settings not given as flags come from the same environment variables as
//! the server (`GOOGLE_GEMINI_API_KEY` is always read from the environment).

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use home_inspector::config::Config;
use home_inspector::frames::{FfmpegDecoder, FrameSampler};
use home_inspector::ingest::VideoMode;
use home_inspector::presenter::render_text;
use home_inspector::provider::GeminiClient;
use home_inspector::session::InspectionSession;

#[derive(Parser, Debug)]
#[clap(name = "inspect")]
#[command(version, about = "Generate a home inspection report from photos and video")]
struct Args {
    /// Still images (or whole videos) to inspect
    #[arg(short, long, num_args = 1..)]
    images: Vec<PathBuf>,

    /// Walkthrough video
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// How the video is handed to the model
    #[arg(short, long, value_enum, default_value_t = VideoMode::Frames)]
    mode: VideoMode,

    /// Reference standards directory
    #[arg(long, env = "STANDARDS_DIR")]
    standards_dir: Option<PathBuf>,

    /// Example reports directory
    #[arg(long, env = "EXAMPLES_DIR")]
    examples_dir: Option<PathBuf>,

    /// Where extracted frames are written
    #[arg(long, env = "FRAMES_DIR")]
    frames_dir: Option<PathBuf>,

    /// Where the report JSON is written
    #[arg(short, long, env = "REPORT_PATH")]
    output: Option<PathBuf>,

    /// Model name
    #[arg(long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Seconds between sampled frames
    #[arg(long, env = "FRAME_INTERVAL_SECS")]
    frame_interval: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.standards_dir {
            config.standards_dir = dir.clone();
        }
        if let Some(dir) = &self.examples_dir {
            config.examples_dir = dir.clone();
        }
        if let Some(dir) = &self.frames_dir {
            config.frames_dir = dir.clone();
        }
        if let Some(path) = &self.output {
            config.report_path = path.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(secs) = self.frame_interval.filter(|s| *s > 0) {
            config.frame_interval_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.images.is_empty() && args.video.is_none() {
        bail!("nothing to inspect: pass --images and/or --video");
    }

    let mut config = Config::from_env().context("Failed to load configuration")?;
    args.apply(&mut config);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling");
            on_ctrl_c.cancel();
        }
    });

    let provider = GeminiClient::new(&config.api_key).context("Failed to build Gemini client")?;
    let mut session = InspectionSession::initialize(&provider, &config)
        .await
        .context("Failed to initialize inspection session")?;

    for failure in &session.load_batch.failed {
        eprintln!("warning: {}: {}", failure.path.display(), failure.reason);
    }

    let options = config.ingest_options();

    if !args.images.is_empty() {
        let batch = session
            .ingest_images(&provider, args.images.clone(), &options, &cancel)
            .await;
        for failure in &batch.failed {
            eprintln!("warning: {}: {}", failure.path.display(), failure.reason);
        }
    }

    if let Some(video) = &args.video {
        let sampler = FrameSampler::new(FfmpegDecoder::default(), config.frame_interval_secs);
        let outcome = session
            .ingest_video(
                &provider,
                &sampler,
                video,
                args.mode,
                &options,
                &cancel,
            )
            .await
            .with_context(|| format!("Failed to ingest {}", video.display()))?;

        if let Some(extraction) = &outcome.extraction {
            println!(
                "Extracted {} frames from {} ({:.1}s)",
                extraction.frames.len(),
                video.display(),
                extraction.duration_secs
            );
            if !extraction.skipped_secs.is_empty() {
                eprintln!("warning: no frame at {:?} seconds", extraction.skipped_secs);
            }
        }
    }

    if session.media.values().all(|m| !m.is_usable()) {
        bail!("no media was uploaded successfully");
    }

    let report = session
        .generate_report(&provider, &config.report_path)
        .await
        .context("Failed to generate report")?;

    print!("{}", render_text(&report));
    println!("\nReport written to {}", config.report_path.display());
    Ok(())
}
