//! Wide per-region view across dimensions.
//!
//! Every completed dimension of a dataset contributes its derived columns,
//! prefixed with the dimension name, to one row per region.

use super::pipeline::{DimensionOutcome, DimensionResult};
use crate::table::{concat_tables, filter_by_region, Axis, Table, TableError};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// The combined table of one dataset, or why it could not be built.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DatasetProfile {
    Built {
        dataset: String,
        dimensions: Vec<String>,
        table: Table,
    },
    Failed {
        dataset: String,
        error: String,
    },
}

/// Build one profile per dataset that has at least one completed dimension.
pub fn build_profiles(outcomes: &[DimensionOutcome]) -> Vec<DatasetProfile> {
    let mut datasets: Vec<&str> = Vec::new();
    for outcome in outcomes {
        if !datasets.contains(&outcome.dataset()) {
            datasets.push(outcome.dataset());
        }
    }

    datasets
        .into_iter()
        .filter_map(|dataset| {
            let results: Vec<&DimensionResult> = outcomes
                .iter()
                .filter(|o| o.dataset() == dataset)
                .filter_map(DimensionOutcome::result)
                .collect();
            if results.is_empty() {
                return None;
            }

            let profile = match build_profile(&results) {
                Ok(table) => DatasetProfile::Built {
                    dataset: dataset.to_string(),
                    dimensions: results.iter().map(|r| r.dimension.clone()).collect(),
                    table,
                },
                Err(e) => {
                    warn!("Cannot build region profile for '{}': {}", dataset, e);
                    DatasetProfile::Failed {
                        dataset: dataset.to_string(),
                        error: e.to_string(),
                    }
                }
            };
            Some(profile)
        })
        .collect()
}

/// Join the derived tables of one dataset side by side, one row per region.
///
/// Regions follow the order of the first result. The region column appears
/// once, unprefixed.
pub fn build_profile(results: &[&DimensionResult]) -> Result<Table, TableError> {
    let first = results.first().ok_or(TableError::EmptyConcat)?;
    let region_column = first.region_column.as_str();

    let prefixed: Vec<Table> = results
        .iter()
        .map(|r| {
            r.table
                .clone()
                .with_prefix(&format!("{}: ", r.dimension), region_column)
        })
        .collect();

    let mut regions: Vec<String> = Vec::new();
    for region in first.table.text(region_column)? {
        if !regions.contains(region) {
            regions.push(region.clone());
        }
    }

    if regions.is_empty() {
        let empty: Vec<Table> = prefixed.iter().map(Table::empty_like).collect();
        return concat_tables(&drop_repeated_regions(empty, region_column), Axis::Columns);
    }

    let mut rows = Vec::with_capacity(regions.len());
    for region in regions {
        let allowed = HashSet::from([region]);
        let parts = prefixed
            .iter()
            .map(|t| filter_by_region(t, region_column, &allowed).map(Table::reset_index))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(concat_tables(
            &drop_repeated_regions(parts, region_column),
            Axis::Columns,
        )?);
    }

    concat_tables(&rows, Axis::Rows)
}

fn drop_repeated_regions(tables: Vec<Table>, region_column: &str) -> Vec<Table> {
    tables
        .into_iter()
        .enumerate()
        .map(|(position, table)| {
            if position == 0 {
                table
            } else {
                table.without_column(region_column)
            }
        })
        .collect()
}
