//! wofs CLI - water observation tiles from reflectance and pixel quality

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use wofs::core::classifier::{MndwiClassifier, MndwiParams};
use wofs::core::histogram::PixelHistogram;
use wofs::core::pipeline::WaterTilePipeline;
use wofs::core::provenance::SourceDatasets;
use wofs::workflow::{
    check_existing_outputs, filter_tasks, load_tasks, TaskOutcome, TileProcessor, TileTask,
};
use wofs::{CellIndex, GeoTiffEmitter, Platform, TileReader, TimeRange, WofsConfig};

#[derive(Parser)]
#[command(name = "wofs")]
#[command(author, version, about = "Water observation flag tiles", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every task of a JSON manifest
    Run {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Task manifest
        #[arg(short, long)]
        tasks: PathBuf,
        /// Limit to a year or inclusive range, e.g. 1996-2001
        #[arg(short, long)]
        year: Option<String>,
        /// List outputs that already exist and stop
        #[arg(long)]
        dry_run: bool,
    },
    /// Produce a single water tile
    Classify {
        /// Reflectance raster
        reflectance: PathBuf,
        /// Pixel-quality raster
        pixel_quality: PathBuf,
        /// Output file
        output: PathBuf,
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "LANDSAT-8")]
        platform: String,
        /// Acquisition time (RFC 3339)
        #[arg(long)]
        time: Option<DateTime<Utc>>,
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        cell_x: i32,
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        cell_y: i32,
        /// MNDWI threshold above which a pixel is wet
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        threshold: f32,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<WofsConfig> {
    let config = match path {
        Some(path) => WofsConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => WofsConfig::default(),
    };
    config.check_location();
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run { config, tasks, year, dry_run } => {
            let config = load_config(config.as_ref())?;
            let range = year.as_deref().map(TimeRange::parse).transpose()?;
            let tasks = filter_tasks(load_tasks(&tasks)?, range.as_ref());

            let pipeline = WaterTilePipeline::from_config(&config, Arc::new(MndwiClassifier::new()))?;
            let emitter = Arc::new(GeoTiffEmitter::new(config.compression.clone()));
            let processor = TileProcessor::new(config, pipeline, emitter);

            if dry_run {
                let existing = check_existing_outputs(&tasks, processor.naming());
                for path in &existing {
                    println!("exists: {}", path.display());
                }
                println!("{} tasks, {} outputs already exist", tasks.len(), existing.len());
                return Ok(());
            }

            let start = Instant::now();
            let report = processor.process_tasks(&tasks);
            for (path, error) in report.failures() {
                eprintln!("failed: {}: {}", path.display(), error);
            }
            println!(
                "{} successful, {} skipped, {} failed in {:.1}s",
                report.successful(),
                report.skipped(),
                report.failed(),
                start.elapsed().as_secs_f64()
            );
            if report.failed() > 0 {
                bail!("{} of {} tasks failed", report.failed(), tasks.len());
            }
        }

        Commands::Classify {
            reflectance,
            pixel_quality,
            output,
            config,
            platform,
            time,
            cell_x,
            cell_y,
            threshold,
        } => {
            let config = load_config(config.as_ref())?;
            let platform = Platform::parse(&platform)?;
            let cell = CellIndex::new(cell_x, cell_y);
            let time = time.unwrap_or_else(Utc::now);

            let start = Instant::now();
            // input file names stand in for dataset ids
            let task = TileTask {
                platform,
                cell,
                time,
                sources: SourceDatasets {
                    reflectance: vec![reflectance.display().to_string()],
                    pixel_quality: vec![pixel_quality.display().to_string()],
                    terrain: vec![],
                },
                reflectance_path: reflectance,
                pixel_quality_path: pixel_quality,
                extent: None,
            };

            let classifier = MndwiClassifier::with_params(MndwiParams { threshold });
            let pipeline = WaterTilePipeline::from_config(&config, Arc::new(classifier))?;
            let emitter = Arc::new(GeoTiffEmitter::new(config.compression.clone()));
            let processor = TileProcessor::new(config, pipeline, emitter);

            if processor.process_task_to(&task, &output)? == TaskOutcome::Skipped {
                bail!("Reflectance and pixel-quality inputs do not overlap");
            }

            let (flags, _) = TileReader::read_flags(&output)?;
            let histogram = PixelHistogram::from_raster(&flags);
            println!("Output: {}", output.display());
            for (flag, count) in histogram.iter() {
                println!("  {:<22} {:>10} ({:.2}%)", flag.name(), count, histogram.percentage(flag));
            }
            println!("Processing time: {:.3}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
