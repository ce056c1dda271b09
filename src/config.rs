//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.incidentstat.toml` files. The built-in default reproduces the
//! state-level analysis of California, New York and Texas over the
//! incident type, age, gender and race/ethnicity sheets.

use crate::analysis::{DimensionSpec, SemanticGroup, DEFAULT_PERCENT_SUFFIX, DEFAULT_TOTAL_COLUMN};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".incidentstat.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Datasets to load, one directory of sheets each.
    #[serde(default = "default_datasets")]
    pub datasets: Vec<DatasetConfig>,

    /// Dimensions run over every dataset.
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<DimensionSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            datasets: default_datasets(),
            dimensions: default_dimensions(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Log at debug level unless `--quiet` is given.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "incident_report.md".to_string()
}

/// One dataset: a directory holding a CSV file per sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name, e.g. "state" or "county".
    pub name: String,

    /// Directory containing `<sheet>.csv` files.
    pub path: PathBuf,

    /// Column naming the region of each row.
    #[serde(default = "default_region_column")]
    pub region_column: String,

    /// Regions to analyze, in report order. Empty means every row.
    #[serde(default)]
    pub regions: Vec<String>,

    /// Regions left out of region shares.
    #[serde(default)]
    pub exclude_regions: Vec<String>,

    /// Extra columns read as text besides the region column.
    #[serde(default)]
    pub text_columns: Vec<String>,
}

impl DatasetConfig {
    /// A dataset whose region column is named after the dataset.
    pub fn named(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
            region_column: name.to_string(),
            regions: Vec::new(),
            exclude_regions: Vec::new(),
            text_columns: Vec::new(),
        }
    }

    /// All columns parsed as text.
    pub fn all_text_columns(&self) -> Vec<String> {
        let mut columns = vec![self.region_column.clone()];
        columns.extend(self.text_columns.iter().cloned());
        columns
    }
}

fn default_region_column() -> String {
    "state".to_string()
}

fn default_datasets() -> Vec<DatasetConfig> {
    vec![DatasetConfig {
        name: "state".to_string(),
        path: PathBuf::from("data/state"),
        region_column: default_region_column(),
        regions: default_regions(),
        exclude_regions: Vec::new(),
        text_columns: Vec::new(),
    }]
}

fn default_regions() -> Vec<String> {
    strings(&["California", "New York", "Texas"])
}

fn default_dimensions() -> Vec<DimensionSpec> {
    vec![
        DimensionSpec {
            name: "type".to_string(),
            sheet: None,
            total_of: Vec::new(),
            total_column: DEFAULT_TOTAL_COLUMN.to_string(),
            percent_suffix: DEFAULT_PERCENT_SUFFIX.to_string(),
            share_of: Some("Harassment".to_string()),
            groups: vec![
                SemanticGroup::new(
                    "Harassment",
                    vec![
                        "Verbal harassment",
                        "Threat of harm to person",
                        "Behavioral harassment",
                        "Written, visual, or auditory materials",
                        "Following or stalking",
                        "Call ICE or police",
                        "Other or unspecified harassment",
                        "Threat of harm to property",
                    ],
                ),
                SemanticGroup::new(
                    "Physical harm or contact",
                    vec![
                        "Attempted physical injury or contact",
                        "Physical contact",
                        "Physical injury",
                        "Coughed at or spat on",
                        "Unspecified physical assault or harassment",
                    ],
                ),
                SemanticGroup::new(
                    "Institutional discrimination",
                    vec![
                        "Government services discrimination",
                        "Business discrimination",
                        "Housing discrimination",
                        "Job discrimination",
                        "Other unfair treatment",
                    ],
                ),
                SemanticGroup::new(
                    "Property harm",
                    vec!["Property damage or abuse", "Robbery or theft"],
                ),
            ],
        },
        raw_dimension(
            "age",
            &["Under 18", "18-25", "26-35", "36-45", "46-60", "60+", "Unknown"],
        ),
        raw_dimension("gender", &["Female", "Nonbinary", "Male", "Unknown"]),
        raw_dimension(
            "race_ethnicity",
            &[
                "Cambodian",
                "Central Asian_grouped",
                "Chinese",
                "P/Filipinx",
                "Latinx",
                "Hmong",
                "Indian",
                "Japanese",
                "Korean",
                "Lao",
                "Pacific Islander",
                "Taiwanese",
                "Thai",
                "Vietnamese",
                "White",
                "Other East Asian",
                "Other South Asian",
                "Other Southeast Asian",
                "Other non-AA/PI",
                "Other or unknown_ethnicity",
            ],
        ),
    ]
}

/// A dimension without groups that totals its raw columns directly.
fn raw_dimension(name: &str, columns: &[&str]) -> DimensionSpec {
    DimensionSpec {
        name: name.to_string(),
        sheet: None,
        total_of: strings(columns),
        total_column: DEFAULT_TOTAL_COLUMN.to_string(),
        percent_suffix: DEFAULT_PERCENT_SUFFIX.to_string(),
        share_of: None,
        groups: Vec::new(),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check names that must be unique and nonempty.
    ///
    /// Column references are checked later against the loaded sheets, per
    /// dimension, so one bad dimension does not stop the others.
    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for dataset in &self.datasets {
            if dataset.name.is_empty() {
                bail!("Dataset name must not be empty");
            }
            if seen.contains(&&dataset.name) {
                bail!("Duplicate dataset '{}'", dataset.name);
            }
            seen.push(&dataset.name);
        }

        let mut seen = Vec::new();
        for dimension in &self.dimensions {
            if dimension.name.is_empty() {
                bail!("Dimension name must not be empty");
            }
            if seen.contains(&&dimension.name) {
                bail!("Duplicate dimension '{}'", dimension.name);
            }
            seen.push(&dimension.name);
        }

        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    ///
    /// Fails if `--dimension` names a dimension the configuration lacks.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) -> Result<()> {
        // Datasets - only the named ones run; a known name keeps its settings
        if !args.datasets.is_empty() {
            let mut selected = Vec::with_capacity(args.datasets.len());
            for (name, path) in &args.datasets {
                let mut dataset = self
                    .datasets
                    .iter()
                    .find(|d| &d.name == name)
                    .cloned()
                    .unwrap_or_else(|| DatasetConfig::named(name, path.clone()));
                dataset.path = path.clone();
                selected.push(dataset);
            }
            self.datasets = selected;
        }

        if let Some(ref regions) = args.regions {
            for dataset in &mut self.datasets {
                dataset.regions = regions.clone();
            }
        }

        if let Some(ref wanted) = args.dimensions {
            let unknown: Vec<&str> = wanted
                .iter()
                .filter(|name| !self.dimensions.iter().any(|d| &&d.name == name))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                let known: Vec<&str> = self.dimensions.iter().map(|d| d.name.as_str()).collect();
                bail!(
                    "Unknown dimension(s): {} (configured: {})",
                    unknown.join(", "),
                    known.join(", ")
                );
            }
            self.dimensions.retain(|d| wanted.contains(&d.name));
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
