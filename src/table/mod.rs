//! Column-oriented in-memory tables.
//!
//! A [`Table`] is an ordered list of equally long, uniquely named columns
//! plus a row index. Structural operations (region filtering and
//! concatenation) live here; the steps that extend a table with derived
//! columns live in [`crate::analysis`].

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors raised by structural table operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// A column does not have as many values as the table has rows.
    #[error("column '{column}' has {found} values but the table has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Two columns share a name.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    /// A named column does not exist.
    #[error("column '{0}' not found")]
    MissingColumn(String),

    /// A column exists but holds the wrong kind of values.
    #[error("column '{column}' is {found}, expected {expected}")]
    WrongKind {
        column: String,
        expected: ColumnKind,
        found: ColumnKind,
    },

    /// Row concatenation over tables with different columns.
    #[error(
        "table {position} has columns [{}] but expected [{}]",
        .found.join(", "),
        .expected.join(", ")
    )]
    SchemaMismatch {
        position: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Column concatenation over tables with different heights.
    #[error("table {position} has {found} rows but expected {expected}")]
    RowCountMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },

    /// Column concatenation over tables that share a column name.
    #[error("column '{column}' of table {position} collides with an earlier column")]
    ColumnCollision { position: usize, column: String },

    /// Concatenation of nothing.
    #[error("cannot concatenate an empty list of tables")]
    EmptyConcat,
}

/// The kind of values a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Free text, e.g. region names.
    Text,
    /// Floating point values; NaN marks a missing or undefined value.
    Number,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Text => write!(f, "text"),
            ColumnKind::Number => write!(f, "numeric"),
        }
    }
}

/// The values of one column.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ColumnData {
    Text(Vec<String>),
    Number(Vec<f64>),
}

impl ColumnData {
    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(values) => values.len(),
            ColumnData::Number(values) => values.len(),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Text(_) => ColumnKind::Text,
            ColumnData::Number(_) => ColumnKind::Number,
        }
    }

    /// An empty column of the same kind.
    fn empty_like(&self) -> Self {
        match self {
            ColumnData::Text(_) => ColumnData::Text(Vec::new()),
            ColumnData::Number(_) => ColumnData::Number(Vec::new()),
        }
    }

    /// Values at the given row positions, in the given order.
    fn take(&self, positions: &[usize]) -> Self {
        match self {
            ColumnData::Text(values) => {
                ColumnData::Text(positions.iter().map(|&i| values[i].clone()).collect())
            }
            ColumnData::Number(values) => {
                ColumnData::Number(positions.iter().map(|&i| values[i]).collect())
            }
        }
    }
}

/// A named column.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "values")]
    pub data: ColumnData,
}

impl Column {
    /// Create a numeric column.
    pub fn numbers(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Number(values),
        }
    }

    /// Create a text column.
    pub fn text<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }

    fn append(&mut self, other: &Column) -> Result<(), TableError> {
        match (&mut self.data, &other.data) {
            (ColumnData::Text(ours), ColumnData::Text(theirs)) => ours.extend_from_slice(theirs),
            (ColumnData::Number(ours), ColumnData::Number(theirs)) => {
                ours.extend_from_slice(theirs)
            }
            (ours, theirs) => {
                return Err(TableError::WrongKind {
                    column: other.name.clone(),
                    expected: ours.kind(),
                    found: theirs.kind(),
                })
            }
        }
        Ok(())
    }
}

/// Axis along which [`concat_tables`] joins its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Stack tables vertically.
    Rows,
    /// Place tables side by side.
    Columns,
}

/// An ordered collection of equally long named columns with a row index.
///
/// The index carries the position each row had in the table it was loaded
/// from, so a filtered table still remembers where its rows came from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    index: Vec<usize>,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table from columns, indexing rows from zero.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let height = columns.first().map_or(0, |c| c.data.len());
        let mut seen = HashSet::new();

        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.data.len() != height {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: height,
                    found: column.data.len(),
                });
            }
        }

        Ok(Self {
            index: (0..height).collect(),
            columns,
        })
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.index.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row index labels.
    #[cfg(test)]
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Names and kinds of all columns, in order.
    pub fn schema(&self) -> Vec<(String, ColumnKind)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.kind()))
            .collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    /// Values of a numeric column.
    pub fn numbers(&self, name: &str) -> Result<&[f64], TableError> {
        match &self.column(name)?.data {
            ColumnData::Number(values) => Ok(values),
            other => Err(TableError::WrongKind {
                column: name.to_string(),
                expected: ColumnKind::Number,
                found: other.kind(),
            }),
        }
    }

    /// Values of a text column.
    pub fn text(&self, name: &str) -> Result<&[String], TableError> {
        match &self.column(name)?.data {
            ColumnData::Text(values) => Ok(values),
            other => Err(TableError::WrongKind {
                column: name.to_string(),
                expected: ColumnKind::Text,
                found: other.kind(),
            }),
        }
    }

    /// Append a column, keeping every existing one untouched.
    pub fn with_column(mut self, column: Column) -> Result<Self, TableError> {
        if self.has_column(&column.name) {
            return Err(TableError::DuplicateColumn(column.name));
        }
        if column.data.len() != self.height() {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.height(),
                found: column.data.len(),
            });
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Drop a column if present.
    pub fn without_column(mut self, name: &str) -> Self {
        self.columns.retain(|c| c.name != name);
        self
    }

    /// Prefix every column name except `keep`.
    pub fn with_prefix(mut self, prefix: &str, keep: &str) -> Self {
        for column in self.columns.iter_mut().filter(|c| c.name != keep) {
            column.name = format!("{}{}", prefix, column.name);
        }
        self
    }

    /// Rows at the given positions, keeping their index labels.
    pub fn take_rows(&self, positions: &[usize]) -> Self {
        Self {
            index: positions.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(positions),
                })
                .collect(),
        }
    }

    /// Relabel rows `0..height`.
    pub fn reset_index(mut self) -> Self {
        self.index = (0..self.height()).collect();
        self
    }

    /// A table with the same columns and no rows.
    pub fn empty_like(&self) -> Self {
        Self {
            index: Vec::new(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.empty_like(),
                })
                .collect(),
        }
    }
}

/// Keep the rows whose region is one of `allowed_regions`.
///
/// Row order and index labels are preserved and the column schema is never
/// changed; no matches yields an empty table with the same columns.
pub fn filter_by_region(
    table: &Table,
    region_column: &str,
    allowed_regions: &HashSet<String>,
) -> Result<Table, TableError> {
    let regions = table.text(region_column)?;

    let positions: Vec<usize> = regions
        .iter()
        .enumerate()
        .filter(|(_, region)| allowed_regions.contains(region.as_str()))
        .map(|(i, _)| i)
        .collect();

    if positions.is_empty() {
        return Ok(table.empty_like());
    }

    Ok(table.take_rows(&positions))
}

/// Concatenate tables along an axis.
///
/// Along [`Axis::Rows`] every input must carry the same columns (in any
/// order) and the index is reset. Along [`Axis::Columns`] every input must
/// have the same height, rows are aligned by position, and column names must
/// not collide.
pub fn concat_tables(tables: &[Table], axis: Axis) -> Result<Table, TableError> {
    match axis {
        Axis::Rows => concat_rows(tables),
        Axis::Columns => concat_columns(tables),
    }
}

fn concat_rows(tables: &[Table]) -> Result<Table, TableError> {
    let (first, rest) = tables.split_first().ok_or(TableError::EmptyConcat)?;
    let mut expected = first.schema();
    expected.sort();

    for (offset, table) in rest.iter().enumerate() {
        let mut found = table.schema();
        found.sort();
        if found != expected {
            return Err(TableError::SchemaMismatch {
                position: offset + 1,
                expected: first.column_names().iter().map(|s| s.to_string()).collect(),
                found: table.column_names().iter().map(|s| s.to_string()).collect(),
            });
        }
    }

    let mut columns = first.columns.clone();
    for table in rest {
        for column in columns.iter_mut() {
            column.append(table.column(&column.name)?)?;
        }
    }

    let height = first.height() + rest.iter().map(Table::height).sum::<usize>();
    Ok(Table {
        index: (0..height).collect(),
        columns,
    })
}

fn concat_columns(tables: &[Table]) -> Result<Table, TableError> {
    let (first, rest) = tables.split_first().ok_or(TableError::EmptyConcat)?;
    let mut seen: HashSet<&str> = first.columns.iter().map(|c| c.name.as_str()).collect();

    for (offset, table) in rest.iter().enumerate() {
        if table.height() != first.height() {
            return Err(TableError::RowCountMismatch {
                position: offset + 1,
                expected: first.height(),
                found: table.height(),
            });
        }
        for column in &table.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::ColumnCollision {
                    position: offset + 1,
                    column: column.name.clone(),
                });
            }
        }
    }

    let columns = tables
        .iter()
        .flat_map(|t| t.columns.iter().cloned())
        .collect();

    Ok(Table {
        index: first.index.clone(),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample_table() -> Table {
        Table::new(vec![
            Column::text("state", vec!["A", "B", "C", "A"]),
            Column::numbers("count", vec![1.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let err = Table::new(vec![
            Column::text("state", vec!["A", "B"]),
            Column::numbers("count", vec![1.0]),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            TableError::LengthMismatch {
                column: "count".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let err = Table::new(vec![
            Column::numbers("count", vec![1.0]),
            Column::numbers("count", vec![2.0]),
        ])
        .unwrap_err();

        assert_eq!(err, TableError::DuplicateColumn("count".to_string()));
    }

    #[test]
    fn test_filter_keeps_order_and_index() {
        let table = sample_table();
        let filtered = filter_by_region(&table, "state", &regions(&["A", "C"])).unwrap();

        assert_eq!(filtered.height(), 3);
        assert_eq!(filtered.index(), &[0, 2, 3]);
        assert_eq!(filtered.numbers("count").unwrap(), &[1.0, 3.0, 4.0]);
        assert_eq!(filtered.schema(), table.schema());
    }

    #[test]
    fn test_filter_without_matches_keeps_schema() {
        let table = sample_table();
        let filtered = filter_by_region(&table, "state", &regions(&["Z"])).unwrap();

        assert!(filtered.is_empty());
        assert_eq!(filtered.column_names(), vec!["state", "count"]);
        assert_eq!(filtered.schema(), table.schema());
    }

    #[test]
    fn test_filter_requires_text_region_column() {
        let table = sample_table();
        let err = filter_by_region(&table, "count", &regions(&["A"])).unwrap_err();

        assert!(matches!(err, TableError::WrongKind { .. }));
    }

    #[test]
    fn test_concat_rows_resets_index() {
        let table = sample_table();
        let a = filter_by_region(&table, "state", &regions(&["A"])).unwrap();
        let c = filter_by_region(&table, "state", &regions(&["C"])).unwrap();

        let joined = concat_tables(&[c, a], Axis::Rows).unwrap();

        assert_eq!(joined.index(), &[0, 1, 2]);
        assert_eq!(joined.text("state").unwrap(), &["C", "A", "A"]);
        assert_eq!(joined.numbers("count").unwrap(), &[3.0, 1.0, 4.0]);
    }

    #[test]
    fn test_concat_rows_accepts_reordered_columns() {
        let first = sample_table();
        let second = Table::new(vec![
            Column::numbers("count", vec![9.0]),
            Column::text("state", vec!["D"]),
        ])
        .unwrap();

        let joined = concat_tables(&[first, second], Axis::Rows).unwrap();

        assert_eq!(joined.column_names(), vec!["state", "count"]);
        assert_eq!(joined.text("state").unwrap()[4], "D");
        assert_eq!(joined.numbers("count").unwrap()[4], 9.0);
    }

    #[test]
    fn test_concat_rows_rejects_schema_mismatch() {
        let first = sample_table();
        let second = Table::new(vec![
            Column::text("state", vec!["D"]),
            Column::numbers("other", vec![9.0]),
        ])
        .unwrap();

        let err = concat_tables(&[first, second], Axis::Rows).unwrap_err();

        assert!(matches!(err, TableError::SchemaMismatch { position: 1, .. }));
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_concat_rows_rejects_kind_mismatch() {
        let first = sample_table();
        let second = Table::new(vec![
            Column::text("state", vec!["D"]),
            Column::text("count", vec!["nine"]),
        ])
        .unwrap();

        assert!(concat_tables(&[first, second], Axis::Rows).is_err());
    }

    #[test]
    fn test_concat_columns_positional() {
        let left = sample_table();
        let right = Table::new(vec![Column::numbers("extra", vec![0.5, 0.25, 0.125, 0.0625])]).unwrap();

        let joined = concat_tables(&[left, right], Axis::Columns).unwrap();

        assert_eq!(joined.column_names(), vec!["state", "count", "extra"]);
        assert_eq!(joined.height(), 4);
        assert_eq!(joined.text("state").unwrap(), &["A", "B", "C", "A"]);
        assert_eq!(joined.numbers("count").unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(joined.numbers("extra").unwrap(), &[0.5, 0.25, 0.125, 0.0625]);
    }

    #[test]
    fn test_concat_columns_rejects_collision() {
        let err = concat_tables(&[sample_table(), sample_table()], Axis::Columns).unwrap_err();

        assert_eq!(
            err,
            TableError::ColumnCollision {
                position: 1,
                column: "state".to_string(),
            }
        );
    }

    #[test]
    fn test_concat_columns_rejects_row_count_mismatch() {
        let right = Table::new(vec![Column::numbers("extra", vec![1.0])]).unwrap();
        let err = concat_tables(&[sample_table(), right], Axis::Columns).unwrap_err();

        assert!(matches!(err, TableError::RowCountMismatch { found: 1, .. }));
    }

    #[test]
    fn test_concat_empty_input() {
        assert_eq!(
            concat_tables(&[], Axis::Rows).unwrap_err(),
            TableError::EmptyConcat
        );
    }

    #[test]
    fn test_filter_concat_round_trip() {
        let table = Table::new(vec![
            Column::text("state", vec!["A", "A", "B", "C", "D"]),
            Column::numbers("count", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
        ])
        .unwrap();

        let parts: Vec<Table> = ["A", "B", "C"]
            .iter()
            .map(|r| filter_by_region(&table, "state", &regions(&[r])).unwrap())
            .collect();
        let joined = concat_tables(&parts, Axis::Rows).unwrap();
        let direct = filter_by_region(&table, "state", &regions(&["A", "B", "C"]))
            .unwrap()
            .reset_index();

        assert_eq!(joined.index(), direct.index());
        assert_eq!(joined.text("state").unwrap(), direct.text("state").unwrap());
        assert_eq!(
            joined.numbers("count").unwrap(),
            direct.numbers("count").unwrap()
        );
    }

    #[test]
    fn test_with_column_append_only() {
        let table = sample_table()
            .with_column(Column::numbers("share", vec![0.0; 4]))
            .unwrap();
        assert_eq!(table.column_names(), vec!["state", "count", "share"]);

        let err = table
            .with_column(Column::numbers("count", vec![0.0; 4]))
            .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("count".to_string()));
    }

    #[test]
    fn test_with_prefix_keeps_region() {
        let table = sample_table().with_prefix("age: ", "state");
        assert_eq!(table.column_names(), vec!["state", "age: count"]);
    }
}
