//! Dataset loading.
//!
//! A dataset is a directory holding one CSV file per sheet, named after the
//! sheet (`type.csv`, `age.csv`, `reporting for.csv`, ...). The region column
//! and any configured text columns are read as text; every other column is
//! numeric, with blank cells treated as missing.

use crate::analysis::RegionScope;
use crate::config::DatasetConfig;
use crate::table::{Column, Table};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A loaded dataset: its region scope plus every sheet found.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub scope: RegionScope,
    /// Sheets by name, sorted.
    pub sheets: BTreeMap<String, Table>,
}

/// Load every `*.csv` sheet in the dataset directory.
pub fn load_dataset(config: &DatasetConfig) -> Result<Dataset> {
    let dir = &config.path;
    if !dir.is_dir() {
        anyhow::bail!(
            "Dataset '{}' directory not found: {}",
            config.name,
            dir.display()
        );
    }

    let text_columns = config.all_text_columns();
    let mut sheets = BTreeMap::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();

        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !entry.file_type().is_file() || !is_csv {
            continue;
        }

        let Some(sheet) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!("Skipping sheet with non UTF-8 name: {}", path.display());
            continue;
        };

        let table = read_sheet(path, &text_columns)?;
        debug!(
            "Loaded sheet '{}' ({} rows, {} columns)",
            sheet,
            table.height(),
            table.width()
        );
        sheets.insert(sheet.to_string(), table);
    }

    info!("Dataset '{}': {} sheets from {}", config.name, sheets.len(), dir.display());

    Ok(Dataset {
        scope: RegionScope {
            dataset: config.name.clone(),
            region_column: config.region_column.clone(),
            regions: config.regions.clone(),
            exclude_regions: config.exclude_regions.clone(),
        },
        sheets,
    })
}

/// Read one sheet from a CSV file.
pub fn read_sheet(path: &Path, text_columns: &[String]) -> Result<Table> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open sheet: {}", path.display()))?;

    parse_sheet(file, text_columns)
        .with_context(|| format!("Failed to parse sheet: {}", path.display()))
}

/// Parse CSV content with a header row into a table.
///
/// Columns with an empty header (spreadsheet index exports) are skipped.
pub fn parse_sheet<R: Read>(reader: R, text_columns: &[String]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
    if headers.is_empty() {
        anyhow::bail!("Sheet has no header row");
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed record at row {}", row + 1))?;
        for (i, values) in cells.iter_mut().enumerate() {
            values.push(record.get(i).unwrap_or("").to_string());
        }
    }

    let mut columns = Vec::with_capacity(headers.len());
    for (name, values) in headers.into_iter().zip(cells) {
        if name.is_empty() {
            debug!("Skipping unnamed column");
            continue;
        }

        if text_columns.contains(&name) {
            columns.push(Column::text(name, values));
            continue;
        }

        let mut unparsed = 0usize;
        let numbers = values
            .iter()
            .map(|raw| {
                parse_count(raw).unwrap_or_else(|| {
                    unparsed += 1;
                    f64::NAN
                })
            })
            .collect();
        if unparsed > 0 {
            warn!(
                "Column '{}': {} non-numeric cells read as missing",
                name, unparsed
            );
        }
        columns.push(Column::numbers(name, numbers));
    }

    Ok(Table::new(columns)?)
}

/// Parse a count cell. Blank cells are missing (NaN); thousands separators
/// are ignored. Returns `None` for anything else that is not a number.
fn parse_count(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Some(f64::NAN);
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn text(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_sheet() {
        let csv = "state,Female,Male\nCalifornia,\"1,204\",310\nTexas,,12\n";
        let table = parse_sheet(csv.as_bytes(), &text(&["state"])).unwrap();

        assert_eq!(table.column_names(), vec!["state", "Female", "Male"]);
        assert_eq!(table.text("state").unwrap(), &["California", "Texas"]);

        let female = table.numbers("Female").unwrap();
        assert_eq!(female[0], 1204.0);
        assert!(female[1].is_nan());
        assert_eq!(table.numbers("Male").unwrap(), &[310.0, 12.0]);
    }

    #[test]
    fn test_parse_sheet_skips_unnamed_columns() {
        let csv = ",state,count\n0,Ohio,3\n";
        let table = parse_sheet(csv.as_bytes(), &text(&["state"])).unwrap();

        assert_eq!(table.column_names(), vec!["state", "count"]);
    }

    #[test]
    fn test_non_numeric_cells_are_missing() {
        let csv = "state,count\nOhio,n/a\n";
        let table = parse_sheet(csv.as_bytes(), &text(&["state"])).unwrap();

        assert!(table.numbers("count").unwrap()[0].is_nan());
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let csv = "state,count\nOhio,3,4\n";
        assert!(parse_sheet(csv.as_bytes(), &text(&["state"])).is_err());
    }

    #[test]
    fn test_duplicate_headers_are_rejected() {
        let csv = "state,count,count\nOhio,3,4\n";
        assert!(parse_sheet(csv.as_bytes(), &text(&["state"])).is_err());
    }

    #[test]
    fn test_load_dataset_reads_csv_sheets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("age.csv"), "state,18-25\nTexas,4\n").unwrap();
        fs::write(
            dir.path().join("reporting for.csv"),
            "state,Self\nTexas,9\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut config = DatasetConfig::named("state", dir.path().to_path_buf());
        config.regions = text(&["Texas"]);

        let dataset = load_dataset(&config).unwrap();

        let sheets: Vec<&str> = dataset.sheets.keys().map(String::as_str).collect();
        assert_eq!(sheets, vec!["age", "reporting for"]);
        assert_eq!(dataset.scope.dataset, "state");
        assert_eq!(dataset.scope.regions, vec!["Texas"]);
        assert_eq!(dataset.sheets["age"].numbers("18-25").unwrap(), &[4.0]);
    }

    #[test]
    fn test_load_dataset_missing_dir() {
        let config = DatasetConfig::named("state", "/no/such/dataset".into());
        let err = load_dataset(&config).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
