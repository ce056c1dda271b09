//! Report data models.
//!
//! This module contains the structures the report generators consume:
//! run metadata, per-dimension outcomes and region profiles.

use crate::analysis::{DatasetProfile, DimensionOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts of completed and failed dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    /// Total number of (dataset, dimension) pairs run.
    pub total: usize,
    /// Pairs that produced a derived table.
    pub completed: usize,
    /// Pairs rejected by a configuration error.
    pub failed: usize,
    /// Failed pairs per dataset.
    pub failed_by_dataset: BTreeMap<String, usize>,
}

impl OutcomeSummary {
    /// Creates a summary from a list of outcomes.
    pub fn from_outcomes(outcomes: &[DimensionOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            if outcome.is_failed() {
                summary.failed += 1;
                *summary
                    .failed_by_dataset
                    .entry(outcome.dataset().to_string())
                    .or_insert(0) += 1;
            } else {
                summary.completed += 1;
            }
        }

        summary
    }
}

/// Metadata about a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Where the configuration came from.
    pub config_source: String,
    /// Datasets loaded, in run order.
    pub datasets: Vec<String>,
    /// Dimensions run, in run order.
    pub dimensions: Vec<String>,
    /// Wall-clock duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: OutcomeSummary,
    /// One entry per (dataset, dimension), datasets outer.
    pub outcomes: Vec<DimensionOutcome>,
    /// One wide per-region table per dataset.
    pub profiles: Vec<DatasetProfile>,
}

impl Report {
    /// Assemble a report, computing the summary from the outcomes.
    pub fn new(
        metadata: ReportMetadata,
        outcomes: Vec<DimensionOutcome>,
        profiles: Vec<DatasetProfile>,
    ) -> Self {
        Self {
            metadata,
            summary: OutcomeSummary::from_outcomes(&outcomes),
            outcomes,
            profiles,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}
