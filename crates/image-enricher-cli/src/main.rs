use anyhow::Context;
use clap::{Parser, Subcommand};
use image_enricher_core::config::LogLevel;
use image_enricher_core::persistence::{AssetFilter, GpsBounds};
use image_enricher_core::{logging, AnalyzeSelection, Config, ImageEnricher, TagCategory};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "image-enricher")]
#[command(about = "Extract EXIF metadata and AI descriptions for a photo collection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write logs to rotating files in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Draw progress bars for batch operations
    #[arg(long, global = true)]
    progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register new images found in a folder
    Scan {
        folder: PathBuf,

        /// Only look at the top level of the folder
        #[arg(long)]
        no_recursive: bool,
    },

    /// Decode EXIF for images that have none stored
    ExtractExif,

    /// Describe images with the vision model and rebuild their tags
    Analyze {
        /// Image ids to analyze (default: every image without an analysis)
        ids: Vec<i64>,

        /// Re-analyze every image
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Scan, extract EXIF and analyze in one go
    ProcessAll {
        /// Folder to scan first
        folder: Option<PathBuf>,
    },

    /// Find stored images
    Search {
        /// Tag label
        #[arg(long)]
        tag: Option<String>,

        /// Tag category (object, person, scene, activity)
        #[arg(long)]
        category: Option<TagCategory>,

        /// Only images with (true) or without (false) EXIF
        #[arg(long)]
        has_exif: Option<bool>,

        /// Only images with (true) or without (false) an analysis
        #[arg(long)]
        has_analysis: Option<bool>,

        /// File name substring
        #[arg(long)]
        name: Option<String>,

        /// GPS box: MIN_LAT MAX_LAT MIN_LON MAX_LON
        #[arg(long, num_args = 4, allow_negative_numbers = true)]
        within: Option<Vec<f64>>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show collection statistics
    Stats,

    /// List tags with how many images carry them
    Tags {
        #[arg(long)]
        category: Option<TagCategory>,
    },

    /// List GPS locations with image counts
    Locations,

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "image-enricher.json")]
        path: PathBuf,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { path } = &cli.command {
        let config = Config::default();
        config.save_to_file(path)?;
        println!("Configuration file generated at: {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::from_env()?,
    };

    match cli.verbose {
        0 => {}
        1 => config.log_level = LogLevel::Debug,
        _ => config.log_level = LogLevel::Trace,
    }
    if cli.progress {
        config.show_progress = true;
    }
    config.validate()?;

    init_logging(&cli, &config)?;

    let enricher = ImageEnricher::new(config)?;

    let cancel = enricher.cancel_handle();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing images in flight");
        cancel.store(true, Ordering::SeqCst);
    })?;

    match cli.command {
        Commands::Scan {
            folder,
            no_recursive,
        } => {
            info!("Scanning {}", folder.display());
            print_json(&enricher.scan(&folder, !no_recursive)?)
        }

        Commands::ExtractExif => print_json(&enricher.extract_missing_exif()?),

        Commands::Analyze { ids, all } => {
            let selection = if all {
                AnalyzeSelection::All
            } else if ids.is_empty() {
                AnalyzeSelection::Missing
            } else {
                AnalyzeSelection::Ids(ids)
            };
            print_json(&enricher.analyze(selection)?)
        }

        Commands::ProcessAll { folder } => print_json(&enricher.process_all(folder.as_deref())?),

        Commands::Search {
            tag,
            category,
            has_exif,
            has_analysis,
            name,
            within,
            limit,
            offset,
        } => {
            let filter = AssetFilter {
                has_exif,
                has_analysis,
                tag,
                tag_category: category,
                within: within.map(|v| GpsBounds {
                    min_latitude: v[0],
                    max_latitude: v[1],
                    min_longitude: v[2],
                    max_longitude: v[3],
                }),
                name_contains: name,
                limit: Some(limit),
                offset,
            };
            print_json(&enricher.store().query_assets(&filter)?)
        }

        Commands::Stats => print_json(&enricher.store().stats()?),

        Commands::Tags { category } => print_json(&enricher.store().tag_counts(category)?),

        Commands::Locations => print_json(&enricher.store().locations()?),

        Commands::GenerateConfig { .. } => Ok(()),
    }
}

fn init_logging(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let level = config.log_level.to_level_filter();
    match &cli.log_dir {
        Some(dir) => logging::init_logger(dir, level)
            .map_err(|e| anyhow::anyhow!("failed to set up logging: {}", e)),
        None => {
            env_logger::Builder::new()
                .filter_level(level)
                .parse_env(logging::LOG_ENV_VAR)
                .init();
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
