//! incidentstat - category totals and percentage breakdowns of incident data
//!
//! A CLI tool that loads sheet-per-file incident datasets, groups raw
//! subcategory counts into semantic categories and reports per-region
//! totals and percentages.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (arguments, config, unreadable dataset, etc.)
//!   2 - A dimension failed and --strict was set

mod analysis;
mod cli;
mod config;
mod loader;
mod models;
mod report;
mod table;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use loader::Dataset;
use models::{Report, ReportMetadata};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so its verbosity applies to logging
    let loaded = load_config(&args);
    let verbose = loaded
        .as_ref()
        .is_ok_and(|loaded| loaded.config.general.verbose);

    // Initialize logging
    if let Err(e) = init_logging(args.log_level(verbose)) {
        eprintln!("Warning: {}", e);
    }

    info!("incidentstat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match loaded {
        Ok(loaded) => run_report(args, loaded).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .incidentstat.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize datasets, regions, dimensions and groups.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run the complete workflow. Returns exit code (0 or 2).
async fn run_report(args: Args, loaded: LoadedConfig) -> Result<i32> {
    let start_time = Instant::now();

    let LoadedConfig {
        config,
        source: config_source,
        warning,
    } = loaded;
    if let Some(warning) = warning {
        warn!("{}", warning);
    }
    info!("Configuration: {}", config_source);

    if config.datasets.is_empty() {
        anyhow::bail!("No datasets configured; pass --dataset NAME=DIR");
    }
    if config.dimensions.is_empty() {
        anyhow::bail!("No dimensions selected");
    }

    // Step 1: Load the datasets
    if !args.quiet {
        println!("📥 Loading {} dataset(s)...", config.datasets.len());
    }
    let mut datasets = Vec::with_capacity(config.datasets.len());
    for dataset_config in &config.datasets {
        let dataset = loader::load_dataset(dataset_config)
            .with_context(|| format!("Failed to load dataset '{}'", dataset_config.name))?;
        datasets.push(dataset);
    }

    // Handle --dry-run: list sheets and exit
    if args.dry_run {
        return Ok(handle_dry_run(&datasets, &config));
    }

    // Step 2: Run every dimension over every dataset
    let pair_count = datasets.len() * config.dimensions.len();
    if !args.quiet {
        println!(
            "\n🔬 Running {} dimension(s) over {} dataset(s)...",
            config.dimensions.len(),
            datasets.len()
        );
    }

    let progress = if args.quiet {
        None
    } else {
        Some(progress_bar(pair_count as u64))
    };
    let outcomes = analysis::run_all(&datasets, &config.dimensions, progress.clone()).await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    // Step 3: Build region profiles and the report
    let profiles = analysis::build_profiles(&outcomes);

    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        config_source,
        datasets: config.datasets.iter().map(|d| d.name.clone()).collect(),
        dimensions: config.dimensions.iter().map(|d| d.name.clone()).collect(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let report = Report::new(metadata, outcomes, profiles);

    // Step 4: Generate and save the report
    let output_path = output_path(&args, &config);
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Print summary
    let summary = &report.summary;
    if !args.quiet {
        println!("\n📊 Summary:");
        println!("   Dimensions run: {}", summary.total);
        println!(
            "   - ✅ Completed: {} | ❌ Failed: {}",
            summary.completed, summary.failed
        );
        for outcome in report.outcomes.iter().filter(|o| o.is_failed()) {
            if let analysis::DimensionOutcome::Failed {
                dataset,
                dimension,
                error,
            } = outcome
            {
                println!("     {}/{}: {}", dataset, dimension, error);
            }
        }
        println!("   Duration: {:.1}s", report.metadata.duration_seconds);
        println!("\n✅ Report saved to: {}", output_path.display());
    }

    if report.has_failures() {
        warn!("{} of {} dimensions failed", summary.failed, summary.total);

        if args.strict {
            eprintln!("\n⛔ {} dimension(s) failed. Failing (exit code 2).", summary.failed);
            return Ok(2);
        }
    }

    Ok(0)
}

/// Handle --dry-run: list the loaded sheets and which dimensions find one.
fn handle_dry_run(datasets: &[Dataset], config: &Config) -> i32 {
    println!("\n🔍 Dry run: listing sheets (nothing computed)...\n");

    for dataset in datasets {
        println!(
            "   Dataset '{}' (region column '{}'):",
            dataset.scope.dataset, dataset.scope.region_column
        );
        if dataset.sheets.is_empty() {
            println!("     No CSV sheets found.");
        }
        for (name, table) in &dataset.sheets {
            println!(
                "     📄 {} ({} rows, {} columns)",
                name,
                table.height(),
                table.width()
            );
        }
        for dimension in &config.dimensions {
            if !dataset.sheets.contains_key(dimension.sheet()) {
                println!(
                    "     ⚠️  dimension '{}' has no sheet '{}'",
                    dimension.name,
                    dimension.sheet()
                );
            }
        }
        println!();
    }

    println!("✅ Dry run complete. No dimensions were computed.");
    0
}

/// Progress bar over (dataset, dimension) pairs.
fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Where the report goes. JSON output defaults to a `.json` file.
fn output_path(args: &Args, config: &Config) -> PathBuf {
    let path = PathBuf::from(&config.general.output);

    if args.output.is_none() && args.format == OutputFormat::Json {
        path.with_extension("json")
    } else {
        path
    }
}

/// Configuration merged with the CLI, plus where it came from.
struct LoadedConfig {
    config: Config,
    source: String,
    /// Deferred until logging is up.
    warning: Option<String>,
}

/// Load configuration from file or use defaults, then apply CLI overrides.
///
/// Runs before logging is initialized, so nothing here logs.
fn load_config(args: &Args) -> Result<LoadedConfig> {
    let (mut config, source, warning) = if let Some(ref config_path) = args.config {
        // Explicit config path
        let config = Config::load(config_path)?;
        (config, config_path.display().to_string(), None)
    } else {
        // Try default location
        match Config::load_default() {
            Ok(Some(config)) => (config, CONFIG_FILE.to_string(), None),
            Ok(None) => (Config::default(), "built-in defaults".to_string(), None),
            Err(e) => (
                Config::default(),
                "built-in defaults".to_string(),
                Some(format!("Failed to load config: {:#}", e)),
            ),
        }
    };

    config.merge_with_args(args)?;
    config.validate()?;

    Ok(LoadedConfig {
        config,
        source,
        warning,
    })
}
