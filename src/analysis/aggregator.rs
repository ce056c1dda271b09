//! Group sums, row totals and percentage columns.
//!
//! Each step takes a table by reference and returns a new table with the
//! derived columns appended after the existing ones. Missing values count
//! as zero when summing; a zero row total makes every percentage of that
//! row NaN.

use crate::table::{Column, ColumnKind, Table, TableError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Default name of the row total column.
pub const DEFAULT_TOTAL_COLUMN: &str = "total";

/// Default suffix of percentage columns.
pub const DEFAULT_PERCENT_SUFFIX: &str = "_percent";

/// Errors raised while deriving columns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// A group lists no source columns.
    #[error("group '{0}' has no source columns")]
    EmptyGroup(String),

    /// A group references columns the table does not have.
    #[error("group '{group}' references unknown columns: {}", .columns.join(", "))]
    UnknownColumns { group: String, columns: Vec<String> },

    /// A row total sums columns the table does not have, or that are not numeric.
    #[error("total '{total}' references unknown columns: {}", .columns.join(", "))]
    UnknownTotalColumns { total: String, columns: Vec<String> },

    /// A derived column would overwrite an existing one.
    #[error("derived column '{0}' already exists in the table")]
    ColumnExists(String),

    /// A dimension has nothing to total.
    #[error("dimension '{0}' has neither groups nor total_of columns")]
    NoMeasures(String),

    /// A dimension names a sheet the dataset does not have.
    #[error("sheet '{0}' not found in dataset")]
    MissingSheet(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// A named set of source columns summed into one derived column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticGroup {
    /// Name of the group; also the name of the derived column.
    pub name: String,
    /// Source columns, summed in this order.
    pub columns: Vec<String>,
}

impl SemanticGroup {
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: Vec<S>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// One labelled value and its fraction of the grand total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub label: String,
    pub value: f64,
    /// `value / grand total`; NaN when the grand total is zero.
    pub fraction: f64,
}

/// Append one summed column per group, in the order given.
///
/// Every group is checked before anything is computed, so a bad group
/// definition leaves no partial result behind.
pub fn compute_group_sums(
    table: &Table,
    groups: &[SemanticGroup],
) -> Result<Table, AggregationError> {
    for group in groups {
        validate_group(table, group)?;
    }
    warn_on_overlap(groups);

    let mut derived = Vec::with_capacity(groups.len());
    for group in groups {
        let sources = group
            .columns
            .iter()
            .map(|name| table.numbers(name))
            .collect::<Result<Vec<_>, _>>()?;
        derived.push(Column::numbers(
            group.name.clone(),
            sum_rows(&sources, table.height()),
        ));
        debug!(
            "Summed {} columns into '{}'",
            group.columns.len(),
            group.name
        );
    }

    let mut out = table.clone();
    for column in derived {
        out = out.with_column(column)?;
    }
    Ok(out)
}

/// Append `total_column` holding the per-row sum of `columns`.
pub fn compute_row_total(
    table: &Table,
    columns: &[String],
    total_column: &str,
) -> Result<Table, AggregationError> {
    let unknown = non_numeric_columns(table, columns);
    if !unknown.is_empty() {
        return Err(AggregationError::UnknownTotalColumns {
            total: total_column.to_string(),
            columns: unknown,
        });
    }

    if table.has_column(total_column) {
        return Err(AggregationError::ColumnExists(total_column.to_string()));
    }

    let sources = columns
        .iter()
        .map(|name| table.numbers(name))
        .collect::<Result<Vec<_>, _>>()?;
    let totals = sum_rows(&sources, table.height());

    Ok(table
        .clone()
        .with_column(Column::numbers(total_column, totals))?)
}

/// Append `"{column}{suffix}"` = `column / total_column` for each column.
///
/// A row whose total is zero gets NaN in every percentage column. A missing
/// numerator under a nonzero total contributes zero.
pub fn compute_percentages(
    table: &Table,
    columns: &[String],
    total_column: &str,
    suffix: &str,
) -> Result<Table, AggregationError> {
    let totals = table.numbers(total_column)?;

    let mut derived = Vec::with_capacity(columns.len());
    for name in columns {
        let target = format!("{}{}", name, suffix);
        if table.has_column(&target) {
            return Err(AggregationError::ColumnExists(target));
        }
        let values = table.numbers(name)?;
        let percents = values
            .iter()
            .zip(totals)
            .map(|(&value, &total)| ratio(value, total))
            .collect();
        derived.push(Column::numbers(target, percents));
    }

    let mut out = table.clone();
    for column in derived {
        out = out.with_column(column)?;
    }
    Ok(out)
}

/// Column-wise sums over all rows, with each sum's share of the grand total.
pub fn column_totals(table: &Table, columns: &[String]) -> Result<Vec<Share>, AggregationError> {
    let mut entries = Vec::with_capacity(columns.len());
    for name in columns {
        let value: f64 = table.numbers(name)?.iter().map(|&v| zero_if_nan(v)).sum();
        entries.push((name.clone(), value));
    }
    Ok(into_shares(entries))
}

/// Each row's value of `value_column` with its share of the column total.
pub fn region_shares(
    table: &Table,
    region_column: &str,
    value_column: &str,
) -> Result<Vec<Share>, AggregationError> {
    let regions = table.text(region_column)?;
    let values = table.numbers(value_column)?;

    let entries = regions
        .iter()
        .zip(values)
        .map(|(region, &value)| (region.clone(), zero_if_nan(value)))
        .collect();
    Ok(into_shares(entries))
}

fn validate_group(table: &Table, group: &SemanticGroup) -> Result<(), AggregationError> {
    if group.columns.is_empty() {
        return Err(AggregationError::EmptyGroup(group.name.clone()));
    }

    let unknown = non_numeric_columns(table, &group.columns);
    if !unknown.is_empty() {
        return Err(AggregationError::UnknownColumns {
            group: group.name.clone(),
            columns: unknown,
        });
    }

    if table.has_column(&group.name) {
        return Err(AggregationError::ColumnExists(group.name.clone()));
    }

    Ok(())
}

/// Names in `columns` that are absent from the table or hold text.
fn non_numeric_columns(table: &Table, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|name| {
            !table
                .column(name)
                .is_ok_and(|c| c.kind() == ColumnKind::Number)
        })
        .cloned()
        .collect()
}

/// Overlapping groups double-count; allowed, but almost always a mistake.
fn warn_on_overlap(groups: &[SemanticGroup]) {
    let mut owner: HashMap<&str, &str> = HashMap::new();
    for group in groups {
        for column in &group.columns {
            if let Some(previous) = owner.insert(column.as_str(), group.name.as_str()) {
                warn!(
                    "Column '{}' is counted by both '{}' and '{}'",
                    column, previous, group.name
                );
            }
        }
    }
}

fn sum_rows(sources: &[&[f64]], height: usize) -> Vec<f64> {
    (0..height)
        .map(|row| sources.iter().map(|values| zero_if_nan(values[row])).sum())
        .collect()
}

fn into_shares(entries: Vec<(String, f64)>) -> Vec<Share> {
    let grand_total: f64 = entries.iter().map(|(_, v)| v).sum();
    entries
        .into_iter()
        .map(|(label, value)| Share {
            fraction: ratio(value, grand_total),
            label,
            value,
        })
        .collect()
}

fn ratio(value: f64, total: f64) -> f64 {
    if total == 0.0 || total.is_nan() {
        f64::NAN
    } else {
        zero_if_nan(value) / total
    }
}

fn zero_if_nan(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn scenario_table() -> Table {
        Table::new(vec![
            Column::text("state", vec!["X", "Y"]),
            Column::numbers("a", vec![1.0, 0.0]),
            Column::numbers("b", vec![2.0, 0.0]),
            Column::numbers("c", vec![0.0, 0.0]),
        ])
        .unwrap()
    }

    fn scenario_groups() -> Vec<SemanticGroup> {
        vec![
            SemanticGroup::new("G1", vec!["a", "b"]),
            SemanticGroup::new("G2", vec!["c"]),
        ]
    }

    fn run_pipeline(table: &Table) -> Table {
        let groups = scenario_groups();
        let measures = names(&["G1", "G2"]);
        let summed = compute_group_sums(table, &groups).unwrap();
        let totalled = compute_row_total(&summed, &measures, DEFAULT_TOTAL_COLUMN).unwrap();
        compute_percentages(
            &totalled,
            &measures,
            DEFAULT_TOTAL_COLUMN,
            DEFAULT_PERCENT_SUFFIX,
        )
        .unwrap()
    }

    #[test]
    fn test_two_group_scenario() {
        let out = run_pipeline(&scenario_table());

        assert_eq!(out.numbers("G1").unwrap(), &[3.0, 0.0]);
        assert_eq!(out.numbers("G2").unwrap(), &[0.0, 0.0]);
        assert_eq!(out.numbers("total").unwrap(), &[3.0, 0.0]);

        let g1 = out.numbers("G1_percent").unwrap();
        let g2 = out.numbers("G2_percent").unwrap();
        assert_eq!(g1[0], 1.0);
        assert_eq!(g2[0], 0.0);
        assert!(g1[1].is_nan());
        assert!(g2[1].is_nan());
    }

    #[test]
    fn test_group_sums_are_append_only() {
        let table = scenario_table();
        let out = compute_group_sums(&table, &scenario_groups()).unwrap();

        assert_eq!(
            out.column_names(),
            vec!["state", "a", "b", "c", "G1", "G2"]
        );
        for name in ["a", "b", "c"] {
            assert_eq!(out.numbers(name).unwrap(), table.numbers(name).unwrap());
        }
        assert_eq!(out.text("state").unwrap(), table.text("state").unwrap());
        assert_eq!(out.index(), table.index());
    }

    #[test]
    fn test_group_order_follows_caller() {
        let groups = vec![
            SemanticGroup::new("Zeta", vec!["c"]),
            SemanticGroup::new("Alpha", vec!["a"]),
        ];
        let out = compute_group_sums(&scenario_table(), &groups).unwrap();

        assert_eq!(&out.column_names()[4..], &["Zeta", "Alpha"]);
    }

    #[test]
    fn test_missing_column_is_reported_before_work() {
        let table = scenario_table();
        let groups = vec![
            SemanticGroup::new("G1", vec!["a", "b"]),
            SemanticGroup::new("G2", vec!["c", "d"]),
        ];

        let err = compute_group_sums(&table, &groups).unwrap_err();

        assert_eq!(
            err,
            AggregationError::UnknownColumns {
                group: "G2".to_string(),
                columns: vec!["d".to_string()],
            }
        );
        assert!(err.to_string().contains('d'));
        assert_eq!(table.column_names(), vec!["state", "a", "b", "c"]);
    }

    #[test]
    fn test_text_column_in_group_is_rejected() {
        let groups = vec![SemanticGroup::new("G", vec!["state"])];
        let err = compute_group_sums(&scenario_table(), &groups).unwrap_err();

        assert!(matches!(err, AggregationError::UnknownColumns { .. }));
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let groups = vec![SemanticGroup::new("G", Vec::<String>::new())];
        let err = compute_group_sums(&scenario_table(), &groups).unwrap_err();

        assert_eq!(err, AggregationError::EmptyGroup("G".to_string()));
    }

    #[test]
    fn test_group_name_collision_is_rejected() {
        let groups = vec![SemanticGroup::new("a", vec!["b"])];
        let err = compute_group_sums(&scenario_table(), &groups).unwrap_err();

        assert_eq!(err, AggregationError::ColumnExists("a".to_string()));
    }

    #[test]
    fn test_overlapping_groups_double_count() {
        let groups = vec![
            SemanticGroup::new("G1", vec!["a", "b"]),
            SemanticGroup::new("G2", vec!["b"]),
        ];
        let out = compute_group_sums(&scenario_table(), &groups).unwrap();

        assert_eq!(out.numbers("G1").unwrap(), &[3.0, 0.0]);
        assert_eq!(out.numbers("G2").unwrap(), &[2.0, 0.0]);
    }

    #[test]
    fn test_missing_values_sum_as_zero() {
        let table = Table::new(vec![
            Column::text("state", vec!["X"]),
            Column::numbers("a", vec![f64::NAN]),
            Column::numbers("b", vec![4.0]),
        ])
        .unwrap();
        let groups = vec![SemanticGroup::new("G", vec!["a", "b"])];

        let out = compute_group_sums(&table, &groups).unwrap();

        assert_eq!(out.numbers("G").unwrap(), &[4.0]);
    }

    #[test]
    fn test_row_total_rejects_existing_column() {
        let err = compute_row_total(&scenario_table(), &names(&["a"]), "b").unwrap_err();
        assert_eq!(err, AggregationError::ColumnExists("b".to_string()));
    }

    #[test]
    fn test_row_total_reports_every_unknown_column() {
        let table = scenario_table();
        let err = compute_row_total(&table, &names(&["a", "d", "state", "e"]), "total").unwrap_err();

        assert_eq!(
            err,
            AggregationError::UnknownTotalColumns {
                total: "total".to_string(),
                columns: names(&["d", "state", "e"]),
            }
        );
        assert_eq!(table.column_names(), vec!["state", "a", "b", "c"]);
    }

    #[test]
    fn test_percentages_reject_existing_column() {
        let measures = names(&["a", "b"]);
        let totalled = compute_row_total(&scenario_table(), &measures, "total").unwrap();
        let with_percent = compute_percentages(&totalled, &measures, "total", "_percent").unwrap();

        let err = compute_percentages(&with_percent, &measures, "total", "_percent").unwrap_err();
        assert_eq!(err, AggregationError::ColumnExists("a_percent".to_string()));
    }

    #[test]
    fn test_row_total_of_zero_row_is_zero() {
        let out = compute_row_total(&scenario_table(), &names(&["a", "b", "c"]), "total").unwrap();
        assert_eq!(out.numbers("total").unwrap(), &[3.0, 0.0]);
    }

    #[test]
    fn test_percentages_sum_to_one() {
        let table = Table::new(vec![
            Column::text("state", vec!["X", "Y", "Z"]),
            Column::numbers("a", vec![7.0, 1.0, f64::NAN]),
            Column::numbers("b", vec![13.0, 0.0, 3.0]),
            Column::numbers("c", vec![0.3, 2.0, 11.0]),
        ])
        .unwrap();
        let measures = names(&["a", "b", "c"]);
        let totalled = compute_row_total(&table, &measures, "total").unwrap();
        let out = compute_percentages(&totalled, &measures, "total", "_percent").unwrap();

        for row in 0..out.height() {
            let sum: f64 = ["a_percent", "b_percent", "c_percent"]
                .iter()
                .map(|name| out.numbers(name).unwrap()[row])
                .sum();
            assert!((sum - 1.0).abs() < 1e-9, "row {} sums to {}", row, sum);
        }
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let table = scenario_table();
        let first = run_pipeline(&table);
        let second = run_pipeline(&table);

        assert_eq!(first.column_names(), second.column_names());
        for column in first.column_names() {
            if let Ok(values) = first.numbers(column) {
                let bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
                let other: Vec<u64> = second
                    .numbers(column)
                    .unwrap()
                    .iter()
                    .map(|v| v.to_bits())
                    .collect();
                assert_eq!(bits, other, "column {}", column);
            }
        }
    }

    #[test]
    fn test_column_totals() {
        let shares = column_totals(&scenario_table(), &names(&["a", "b", "c"])).unwrap();

        assert_eq!(shares.len(), 3);
        assert_eq!(shares[1].label, "b");
        assert_eq!(shares[1].value, 2.0);
        assert!((shares[0].fraction - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(shares[2].fraction, 0.0);
    }

    #[test]
    fn test_region_shares_of_all_zero_column() {
        let shares = region_shares(&scenario_table(), "state", "c").unwrap();

        assert_eq!(shares[0].label, "X");
        assert!(shares.iter().all(|s| s.fraction.is_nan()));
    }
}
