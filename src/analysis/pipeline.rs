//! Per-dimension driver for the aggregation steps.
//!
//! A dimension (incident type, age, gender, race/ethnicity, ...) is one
//! sheet plus the groups and measure columns that turn its raw counts into
//! totals and percentages. Every (dataset, dimension) pair runs on its own
//! copy of the sheet, so pairs are independent and a failing pair never
//! takes the others down.

use super::aggregator::{
    column_totals, compute_group_sums, compute_percentages, compute_row_total, region_shares,
    AggregationError, SemanticGroup, Share, DEFAULT_PERCENT_SUFFIX, DEFAULT_TOTAL_COLUMN,
};
use crate::loader::Dataset;
use crate::table::{concat_tables, filter_by_region, Axis, Table, TableError};
use futures::future::join_all;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Configuration of one categorical dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSpec {
    /// Dimension name, used in reports and column prefixes.
    pub name: String,

    /// Sheet holding the raw counts; defaults to the dimension name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,

    /// Columns summed into the row total and turned into percentages.
    /// Defaults to the group names.
    #[serde(default)]
    pub total_of: Vec<String>,

    #[serde(default = "default_total_column")]
    pub total_column: String,

    #[serde(default = "default_percent_suffix")]
    pub percent_suffix: String,

    /// Column whose per-region share of the whole sheet is reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_of: Option<String>,

    /// Semantic groups, derived in this order.
    #[serde(default)]
    pub groups: Vec<SemanticGroup>,
}

fn default_total_column() -> String {
    DEFAULT_TOTAL_COLUMN.to_string()
}

fn default_percent_suffix() -> String {
    DEFAULT_PERCENT_SUFFIX.to_string()
}

impl DimensionSpec {
    /// Sheet name this dimension reads.
    pub fn sheet(&self) -> &str {
        self.sheet.as_deref().unwrap_or(&self.name)
    }

    /// Columns that make up the row total, in order.
    pub fn measure_columns(&self) -> Vec<String> {
        if self.total_of.is_empty() {
            self.groups.iter().map(|g| g.name.clone()).collect()
        } else {
            self.total_of.clone()
        }
    }

    /// Names of the percentage columns, in measure order.
    pub fn percent_columns(&self) -> Vec<String> {
        self.measure_columns()
            .iter()
            .map(|c| format!("{}{}", c, self.percent_suffix))
            .collect()
    }
}

/// Which rows of a dataset the pipeline looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionScope {
    /// Dataset name.
    pub dataset: String,
    /// Column naming the region of each row.
    pub region_column: String,
    /// Regions to keep, in output order. Empty keeps every row.
    pub regions: Vec<String>,
    /// Regions left out of region shares (e.g. a national total row).
    pub exclude_regions: Vec<String>,
}

/// Derived table and summaries of one dimension.
#[derive(Debug, Clone, Serialize)]
pub struct DimensionResult {
    pub dataset: String,
    pub dimension: String,
    pub region_column: String,
    pub group_columns: Vec<String>,
    pub measure_columns: Vec<String>,
    pub total_column: String,
    pub percent_columns: Vec<String>,
    /// Selected rows with group sums, total and percentages appended.
    pub table: Table,
    /// Sum of every measure column over the selected rows.
    pub category_totals: Vec<Share>,
    /// Per-region share of `share_of` over the whole sheet.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub region_shares: Vec<Share>,
}

/// Outcome of one (dataset, dimension) pair.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DimensionOutcome {
    Completed(DimensionResult),
    Failed {
        dataset: String,
        dimension: String,
        error: String,
    },
}

impl DimensionOutcome {
    pub fn dataset(&self) -> &str {
        match self {
            DimensionOutcome::Completed(result) => &result.dataset,
            DimensionOutcome::Failed { dataset, .. } => dataset,
        }
    }

    pub fn dimension(&self) -> &str {
        match self {
            DimensionOutcome::Completed(result) => &result.dimension,
            DimensionOutcome::Failed { dimension, .. } => dimension,
        }
    }

    pub fn result(&self) -> Option<&DimensionResult> {
        match self {
            DimensionOutcome::Completed(result) => Some(result),
            DimensionOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DimensionOutcome::Failed { .. })
    }
}

/// Rows of the requested regions, ordered by region then by source order.
///
/// An empty request keeps every row. The index is reset either way.
pub fn select_regions(
    table: &Table,
    region_column: &str,
    regions: &[String],
) -> Result<Table, TableError> {
    if regions.is_empty() {
        // Still validates the region column.
        table.text(region_column)?;
        return Ok(table.clone().reset_index());
    }

    let mut parts = Vec::with_capacity(regions.len());
    for region in regions {
        let allowed = HashSet::from([region.clone()]);
        let part = filter_by_region(table, region_column, &allowed)?;
        if part.is_empty() {
            warn!("Region '{}' has no rows in column '{}'", region, region_column);
        }
        parts.push(part);
    }

    concat_tables(&parts, Axis::Rows)
}

/// Run one dimension over one sheet.
pub fn run_dimension(
    sheet: &Table,
    scope: &RegionScope,
    spec: &DimensionSpec,
) -> Result<DimensionResult, AggregationError> {
    let measures = spec.measure_columns();
    if measures.is_empty() {
        return Err(AggregationError::NoMeasures(spec.name.clone()));
    }

    let selected = select_regions(sheet, &scope.region_column, &scope.regions)?;
    debug!(
        "{}/{}: {} of {} rows selected",
        scope.dataset,
        spec.name,
        selected.height(),
        sheet.height()
    );

    let summed = compute_group_sums(&selected, &spec.groups)?;
    let totalled = compute_row_total(&summed, &measures, &spec.total_column)?;
    let table = compute_percentages(
        &totalled,
        &measures,
        &spec.total_column,
        &spec.percent_suffix,
    )?;

    let category_totals = column_totals(&table, &measures)?;

    let region_shares = match &spec.share_of {
        Some(column) => shares_over_sheet(sheet, scope, spec, column)?,
        None => Vec::new(),
    };

    Ok(DimensionResult {
        dataset: scope.dataset.clone(),
        dimension: spec.name.clone(),
        region_column: scope.region_column.clone(),
        group_columns: spec.groups.iter().map(|g| g.name.clone()).collect(),
        percent_columns: spec.percent_columns(),
        measure_columns: measures,
        total_column: spec.total_column.clone(),
        table,
        category_totals,
        region_shares,
    })
}

fn shares_over_sheet(
    sheet: &Table,
    scope: &RegionScope,
    spec: &DimensionSpec,
    column: &str,
) -> Result<Vec<Share>, AggregationError> {
    let kept: HashSet<String> = sheet
        .text(&scope.region_column)?
        .iter()
        .filter(|r| !scope.exclude_regions.contains(*r))
        .cloned()
        .collect();
    let base = filter_by_region(sheet, &scope.region_column, &kept)?;
    let summed = compute_group_sums(&base, &spec.groups)?;

    region_shares(&summed, &scope.region_column, column)
}

/// Run every dimension over every dataset concurrently.
///
/// Outcomes come back datasets-outer, dimensions-inner, regardless of
/// completion order.
pub async fn run_all(
    datasets: &[Dataset],
    specs: &[DimensionSpec],
    progress: Option<ProgressBar>,
) -> Vec<DimensionOutcome> {
    let mut tasks = Vec::with_capacity(datasets.len() * specs.len());

    for dataset in datasets {
        for spec in specs {
            let scope = dataset.scope.clone();
            let spec = spec.clone();
            let sheet = dataset.sheets.get(spec.sheet()).cloned();
            let progress = progress.clone();

            tasks.push(async move {
                let dataset = scope.dataset.clone();
                let dimension = spec.name.clone();

                let handle = tokio::task::spawn_blocking(move || match sheet {
                    Some(sheet) => run_dimension(&sheet, &scope, &spec),
                    None => Err(AggregationError::MissingSheet(spec.sheet().to_string())),
                });

                let outcome = match handle.await {
                    Ok(Ok(result)) => {
                        info!("{}/{}: {} rows derived", dataset, dimension, result.table.height());
                        DimensionOutcome::Completed(result)
                    }
                    Ok(Err(e)) => {
                        warn!("{}/{} failed: {}", dataset, dimension, e);
                        DimensionOutcome::Failed {
                            dataset,
                            dimension,
                            error: e.to_string(),
                        }
                    }
                    Err(e) => DimensionOutcome::Failed {
                        dataset,
                        dimension,
                        error: format!("worker task failed: {}", e),
                    },
                };

                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                outcome
            });
        }
    }

    join_all(tasks).await
}
