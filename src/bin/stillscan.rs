use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use stillscan::{
    BoundaryRule, BoundarySearch, MetricKind, ScoreCallback, SearchOptions, SearchOutcome,
    StillscanError, format_timestamp,
};

const CLI_AFTER_HELP: &str = "Exit codes:\n  0  boundary found\n  1  stream exhausted without a match\n  2  error\n\nExamples:\n  stillscan episode.mkv intro_last_frame.png\n  stillscan episode.mkv intro_first_frame.png --mode start --threshold 0.85\n  stillscan episode.mkv ref.png --workers 4 --batch-size 500 --progress\n  stillscan episode.mkv ref.png --json --no-csv";

#[derive(Debug, Parser)]
#[command(
    name = "stillscan",
    version,
    about = "Locate where a video segment starts or ends by matching frames against a reference still",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Input video path.
    video: PathBuf,

    /// Reference still image path (converted to grayscale).
    reference: PathBuf,

    #[command(flatten)]
    detection: DetectionOptions,

    #[command(flatten)]
    tuning: TuningOptions,

    #[command(flatten)]
    output: OutputOptions,
}

#[derive(Debug, Parser, Clone, Default)]
struct DetectionOptions {
    /// Which boundary to look for: 'end' (reference is inside the segment)
    /// or 'start' (reference is the segment's first frame).
    #[arg(long, default_value = "end")]
    mode: String,

    /// Score drop that declares the segment end (negative; end mode only).
    #[arg(long, allow_hyphen_values = true)]
    drop: Option<f32>,

    /// Score that declares the segment start (start mode only).
    #[arg(long)]
    threshold: Option<f32>,

    /// Frames subtracted from the trigger index when reporting (0-2).
    #[arg(long, default_value_t = stillscan::DEFAULT_LAG_CORRECTION)]
    lag: u32,

    /// Similarity metric: ssim | pixel.
    #[arg(long, default_value = "ssim")]
    metric: String,
}

#[derive(Debug, Parser, Clone, Default)]
struct TuningOptions {
    /// Frames dispatched per batch.
    #[arg(long, default_value_t = stillscan::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Scoring worker count (default: one per available core).
    #[arg(long)]
    workers: Option<usize>,

    /// Bounded work queue capacity.
    #[arg(long, default_value_t = stillscan::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Worker dequeue timeout in milliseconds.
    #[arg(long)]
    poll_timeout_ms: Option<u64>,

    /// Dispatcher enqueue timeout in milliseconds.
    #[arg(long)]
    dispatch_timeout_ms: Option<u64>,

    /// Wall-clock deadline per batch in seconds.
    #[arg(long)]
    batch_deadline_secs: Option<u64>,

    /// Stop scanning after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Override the container frame rate for timestamp conversion.
    #[arg(long)]
    fps: Option<f64>,
}

#[derive(Debug, Parser, Clone, Default)]
struct OutputOptions {
    /// Score CSV path ('index,score' per scanned frame).
    #[arg(long, default_value = "out.csv")]
    csv: PathBuf,

    /// Skip writing the score CSV.
    #[arg(long)]
    no_csv: bool,

    /// Write debug PNGs (grayscale reference, boundary trigger frame) here.
    #[arg(long)]
    debug_images: Option<PathBuf>,

    /// Emit a single JSON object instead of text output.
    #[arg(long)]
    json: bool,

    /// Show a progress spinner instead of per-frame score lines.
    #[arg(long)]
    progress: bool,

    /// Suppress per-frame score lines.
    #[arg(long)]
    quiet: bool,

    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,
}

enum RunStatus {
    Found,
    NotFound,
}

fn parse_rule(
    mode: &str,
    drop: Option<f32>,
    threshold: Option<f32>,
) -> Result<BoundaryRule, Box<dyn std::error::Error>> {
    match mode.to_ascii_lowercase().as_str() {
        "end" | "last" => {
            if threshold.is_some() {
                return Err("--threshold only applies to --mode start (use --drop)".into());
            }
            let max_drop = drop.unwrap_or(BoundaryRule::DEFAULT_END_DROP);
            if !(max_drop < 0.0) {
                return Err(format!("--drop must be negative, got {max_drop}").into());
            }
            Ok(BoundaryRule::SegmentEnd { max_drop })
        }
        "start" | "first" => {
            if drop.is_some() {
                return Err("--drop only applies to --mode end (use --threshold)".into());
            }
            let min_score = threshold.unwrap_or(BoundaryRule::DEFAULT_START_SCORE);
            if !(min_score > 0.0 && min_score <= 1.0) {
                return Err(format!("--threshold must be in (0, 1], got {min_score}").into());
            }
            Ok(BoundaryRule::SegmentStart { min_score })
        }
        other => Err(format!("unsupported --mode: {other} (expected 'end' or 'start')").into()),
    }
}

/// Prints one `index,score` line per scored frame, like the CSV.
struct TerminalScores;

impl ScoreCallback for TerminalScores {
    fn on_score(&self, frame_index: u64, score: f32) {
        println!("{frame_index},{score}");
    }
}

/// Ticks the spinner once per scored frame.
struct ProgressScores {
    bar: ProgressBar,
}

impl ScoreCallback for ProgressScores {
    fn on_score(&self, _frame_index: u64, _score: f32) {
        self.bar.inc(1);
    }
}

#[cfg(feature = "ffmpeg")]
fn open_video(
    path: &std::path::Path,
    width: u32,
    height: u32,
) -> Result<stillscan::VideoSource, StillscanError> {
    stillscan::VideoSource::open(path, width, height)
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(
    path: &std::path::Path,
    _width: u32,
    _height: u32,
) -> Result<stillscan::SyntheticSource, StillscanError> {
    log::debug!("no decoder available for {}", path.display());
    Err(StillscanError::DecoderUnavailable)
}

fn run() -> Result<RunStatus, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.output.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let rule = parse_rule(
        &cli.detection.mode,
        cli.detection.drop,
        cli.detection.threshold,
    )?;
    let metric: MetricKind = cli.detection.metric.parse()?;

    let reference = image::open(&cli.reference)
        .map_err(|error| {
            format!(
                "failed to open reference image {}: {error}",
                cli.reference.display()
            )
        })?
        .to_luma8();
    let (width, height) = reference.dimensions();

    let mut options = SearchOptions::new()
        .with_rule(rule)
        .with_lag_correction(cli.detection.lag)
        .with_batch_size(cli.tuning.batch_size)
        .with_queue_capacity(cli.tuning.queue_capacity);

    if let Some(workers) = cli.tuning.workers {
        options = options.with_workers(workers);
    }
    if let Some(ms) = cli.tuning.poll_timeout_ms {
        options = options.with_poll_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.tuning.dispatch_timeout_ms {
        options = options.with_dispatch_timeout(Duration::from_millis(ms));
    }
    if let Some(secs) = cli.tuning.batch_deadline_secs {
        options = options.with_batch_deadline(Duration::from_secs(secs));
    }
    if let Some(max) = cli.tuning.max_frames {
        options = options.with_max_frames(max);
    }
    if let Some(fps) = cli.tuning.fps {
        options = options.with_fps(fps);
    }
    if !cli.output.no_csv {
        options = options.with_score_log(&cli.output.csv);
    }
    if let Some(dir) = &cli.output.debug_images {
        options = options.with_debug_images(dir);
    }

    let progress_bar = if cli.output.progress && !cli.output.json {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.green} {pos} frames scored ({per_sec})")?;
        bar.set_style(style);
        Some(bar)
    } else {
        None
    };

    if let Some(bar) = &progress_bar {
        options = options.with_observer(Arc::new(ProgressScores { bar: bar.clone() }));
    } else if !cli.output.quiet && !cli.output.json {
        options = options.with_observer(Arc::new(TerminalScores));
    }

    let mut source = open_video(&cli.video, width, height)?;
    let search = BoundarySearch::with_metric(reference, metric.build(), options);
    let outcome = search.run(&mut source)?;

    if let Some(bar) = progress_bar {
        bar.finish_and_clear();
    }

    match outcome {
        SearchOutcome::Found(event) => {
            if cli.output.json {
                println!(
                    "{}",
                    json!({
                        "found": true,
                        "mode": rule.label(),
                        "frame_index": event.frame_index,
                        "timestamp_seconds": event.timestamp_seconds,
                        "timestamp": format_timestamp(event.timestamp_seconds),
                    })
                );
            } else {
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Intro {} timestamp {} (frame {})",
                        rule.label(),
                        format_timestamp(event.timestamp_seconds),
                        event.frame_index
                    )
                    .green()
                );
                if !cli.output.no_csv {
                    println!("{} {}", "saved".green().bold(), cli.output.csv.display());
                }
            }
            Ok(RunStatus::Found)
        }
        SearchOutcome::Exhausted { frames_scanned } => {
            if cli.output.json {
                println!(
                    "{}",
                    json!({
                        "found": false,
                        "mode": rule.label(),
                        "frames_scanned": frames_scanned,
                    })
                );
            } else {
                println!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("Ran out of frames after {frames_scanned} without a match").yellow()
                );
                if !cli.output.no_csv {
                    println!("{} {}", "saved".green().bold(), cli.output.csv.display());
                }
            }
            Ok(RunStatus::NotFound)
        }
    }
}

fn main() {
    match run() {
        Ok(RunStatus::Found) => {}
        Ok(RunStatus::NotFound) => std::process::exit(1),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(2);
        }
    }
}
