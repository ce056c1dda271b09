//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// incidentstat - category totals and percentage breakdowns of incident data
///
/// Loads sheet-per-file incident datasets, groups raw subcategory counts
/// into semantic categories, and reports per-region totals and percentages
/// as Markdown or JSON.
///
/// Examples:
///   incidentstat --dataset state=./data/state
///   incidentstat --dataset county=./data/county --regions "Los Angeles,Queens"
///   incidentstat --dimension type,gender --format json -o report.json
///   incidentstat --dry-run
///   incidentstat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Dataset directory as NAME=DIR (repeatable)
    ///
    /// Replaces the path of a configured dataset with the same name, or adds
    /// a new dataset whose region column is named after it.
    #[arg(long = "dataset", value_name = "NAME=DIR", value_parser = parse_dataset)]
    pub datasets: Vec<(String, PathBuf)>,

    /// Regions to analyze (comma-separated), applied to every dataset
    ///
    /// Example: --regions "California,New York,Texas"
    #[arg(long, value_name = "REGIONS", value_delimiter = ',', value_parser = parse_name)]
    pub regions: Option<Vec<String>>,

    /// Dimensions to run (comma-separated); defaults to all configured ones
    #[arg(
        long = "dimension",
        value_name = "NAMES",
        value_delimiter = ',',
        value_parser = parse_name
    )]
    pub dimensions: Option<Vec<String>>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .incidentstat.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 if any dimension fails
    #[arg(long)]
    pub strict: bool,

    /// Dry run: load the datasets and list their sheets without computing
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .incidentstat.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Parse a `NAME=DIR` dataset argument.
fn parse_dataset(value: &str) -> Result<(String, PathBuf), String> {
    let (name, dir) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=DIR, got '{}'", value))?;
    let name = name.trim();

    if name.is_empty() {
        return Err("dataset name must not be empty".to_string());
    }
    if dir.is_empty() {
        return Err(format!("dataset '{}' has an empty directory", name));
    }

    Ok((name.to_string(), PathBuf::from(dir)))
}

/// Parse one item of a comma-separated name list, trimming the spaces
/// around it so "California, New York" matches the trimmed sheet cells.
fn parse_name(value: &str) -> Result<String, String> {
    Ok(value.trim().to_string())
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref regions) = self.regions {
            if regions.iter().any(|r| r.trim().is_empty()) {
                return Err("Region names must not be empty".to_string());
            }
        }

        if let Some(ref dimensions) = self.dimensions {
            if dimensions.is_empty() || dimensions.iter().any(|d| d.trim().is_empty()) {
                return Err("Dimension names must not be empty".to_string());
            }
        }

        // Validate dataset directories
        for (name, dir) in &self.datasets {
            if !dir.is_dir() {
                return Err(format!(
                    "Dataset '{}' directory does not exist: {}",
                    name,
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` comes from the configuration file; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
