//! Markdown and JSON report generation.
//!
//! This module renders the derived tables of a run. Undefined percentages
//! (zero row totals) are written as `n/a` in Markdown and `null` in JSON,
//! never as zero.

use crate::analysis::{DatasetProfile, DimensionOutcome, DimensionResult, Share};
use crate::models::{OutcomeSummary, Report, ReportMetadata};
use crate::table::{ColumnData, Table};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Incident Category Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_summary_section(&report.summary, &report.outcomes));

    for dataset in &report.metadata.datasets {
        output.push_str(&generate_dataset_section(dataset, &report.outcomes));
    }

    output.push_str(&generate_profiles_section(&report.profiles));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Configuration:** {}\n", metadata.config_source));
    section.push_str(&format!(
        "- **Datasets:** {}\n",
        metadata.datasets.join(", ")
    ));
    section.push_str(&format!(
        "- **Dimensions:** {}\n",
        metadata.dimensions.join(", ")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");

    for dataset in &report.metadata.datasets {
        toc.push_str(&format!(
            "- [Dataset: {}](#{})\n",
            dataset,
            anchor(&format!("Dataset: {}", dataset))
        ));
        for outcome in report.outcomes.iter().filter(|o| o.dataset() == dataset) {
            toc.push_str(&format!(
                "  - [{}](#{})\n",
                outcome.dimension(),
                anchor(&format!("{}: {}", dataset, outcome.dimension()))
            ));
        }
    }

    if !report.profiles.is_empty() {
        toc.push_str("- [Region Profiles](#region-profiles)\n");
    }

    toc.push('\n');

    toc
}

/// Generate the summary section.
fn generate_summary_section(summary: &OutcomeSummary, outcomes: &[DimensionOutcome]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Dimensions Run | ✅ Completed | ❌ Failed |\n");
    section.push_str("|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} |\n\n",
        summary.total, summary.completed, summary.failed
    ));

    let failures: Vec<_> = outcomes.iter().filter(|o| o.is_failed()).collect();
    if !failures.is_empty() {
        section.push_str("### Failed Dimensions\n\n");
        section.push_str("| Dataset | Dimension | Error |\n");
        section.push_str("|:---|:---|:---|\n");
        for outcome in failures {
            if let DimensionOutcome::Failed {
                dataset,
                dimension,
                error,
            } = outcome
            {
                section.push_str(&format!(
                    "| {} | {} | {} |\n",
                    cell(dataset),
                    cell(dimension),
                    cell(error)
                ));
            }
        }
        section.push('\n');
    }

    section
}

/// Generate the section for one dataset.
fn generate_dataset_section(dataset: &str, outcomes: &[DimensionOutcome]) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Dataset: {}\n\n", dataset));

    for outcome in outcomes.iter().filter(|o| o.dataset() == dataset) {
        section.push_str(&format!("### {}: {}\n\n", dataset, outcome.dimension()));

        match outcome {
            DimensionOutcome::Completed(result) => {
                section.push_str(&generate_dimension_block(result));
            }
            DimensionOutcome::Failed { error, .. } => {
                section.push_str(&format!("> ❌ **Not computed:** {}\n\n", error));
            }
        }
    }

    section
}

/// Generate the tables of one completed dimension.
fn generate_dimension_block(result: &DimensionResult) -> String {
    let mut block = String::new();
    let table = &result.table;

    if table.is_empty() {
        block.push_str("*No rows matched the requested regions.*\n\n");
    } else {
        block.push_str("#### Counts\n\n");
        let mut columns = result.measure_columns.clone();
        columns.push(result.total_column.clone());
        block.push_str(&region_table(table, &result.region_column, &columns, format_count));

        block.push_str("#### Percentages\n\n");
        block.push_str(&region_table(
            table,
            &result.region_column,
            &result.percent_columns,
            format_percent,
        ));
    }

    if !result.category_totals.is_empty() {
        block.push_str("#### Category Totals\n\n");
        block.push_str(&share_table("Category", &result.category_totals));
    }

    if !result.region_shares.is_empty() {
        block.push_str("#### Share by Region\n\n");
        block.push_str(&share_table("Region", &result.region_shares));
    }

    block.push_str("---\n\n");

    block
}

/// Generate the region profiles, one column per region.
fn generate_profiles_section(profiles: &[DatasetProfile]) -> String {
    if profiles.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Region Profiles\n\n");

    for profile in profiles {
        match profile {
            DatasetProfile::Built {
                dataset,
                dimensions,
                table,
            } => {
                section.push_str(&format!("### {}\n\n", dataset));
                section.push_str(&format!("*Dimensions: {}*\n\n", dimensions.join(", ")));
                section.push_str(&transposed_table(table));
            }
            DatasetProfile::Failed { dataset, error } => {
                section.push_str(&format!("### {}\n\n", dataset));
                section.push_str(&format!("> ❌ **Not built:** {}\n\n", error));
            }
        }
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by incidentstat v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// One row per region, one column per named column.
fn region_table(
    table: &Table,
    region_column: &str,
    columns: &[String],
    format: fn(f64) -> String,
) -> String {
    let regions = table.text(region_column).unwrap_or(&[]);

    let mut headers = vec![region_column.to_string()];
    headers.extend(columns.iter().cloned());

    let values: Vec<&[f64]> = columns
        .iter()
        .map(|name| table.numbers(name).unwrap_or(&[]))
        .collect();

    let rows = (0..table.height())
        .map(|row| {
            let mut cells = vec![regions.get(row).cloned().unwrap_or_default()];
            cells.extend(
                values
                    .iter()
                    .map(|column| column.get(row).map_or_else(|| "n/a".to_string(), |v| format(*v))),
            );
            cells
        })
        .collect();

    markdown_table(&headers, rows)
}

fn share_table(label: &str, shares: &[Share]) -> String {
    let headers = vec![label.to_string(), "Count".to_string(), "Share".to_string()];
    let rows = shares
        .iter()
        .map(|s| vec![s.label.clone(), format_count(s.value), format_percent(s.fraction)])
        .collect();

    markdown_table(&headers, rows)
}

/// Columns become rows so wide profiles stay readable.
fn transposed_table(table: &Table) -> String {
    let Some(first) = table.columns().first() else {
        return String::new();
    };

    let mut headers = vec![first.name.clone()];
    headers.extend(column_cells(&first.data));

    let rows = table
        .columns()
        .iter()
        .skip(1)
        .map(|column| {
            let mut cells = vec![column.name.clone()];
            cells.extend(column_cells(&column.data));
            cells
        })
        .collect();

    markdown_table(&headers, rows)
}

fn column_cells(data: &ColumnData) -> Vec<String> {
    match data {
        ColumnData::Text(values) => values.clone(),
        ColumnData::Number(values) => values.iter().map(|v| format_count(*v)).collect(),
    }
}

fn markdown_table(headers: &[String], rows: Vec<Vec<String>>) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "| {} |\n",
        headers.iter().map(|h| cell(h)).collect::<Vec<_>>().join(" | ")
    ));
    out.push_str(&format!(
        "|:---|{}\n",
        ":---:|".repeat(headers.len().saturating_sub(1))
    ));
    for row in rows {
        out.push_str(&format!(
            "| {} |\n",
            row.iter().map(|c| cell(c)).collect::<Vec<_>>().join(" | ")
        ));
    }
    out.push('\n');

    out
}

/// Format a count; whole numbers print without decimals.
fn format_count(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// Format a fraction as a percentage.
fn format_percent(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.1}%", value * 100.0)
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// GitHub-style heading anchor.
fn anchor(heading: &str) -> String {
    heading
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}
