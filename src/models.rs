//! Data models for the dashboard pipeline.
//!
//! This module contains the core data structures passed between the
//! recategorizer, the aggregator and the export layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label given to entities that match no rule.
pub const OTHER_LABEL: &str = "Other";

/// How values are aggregated per time bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Number of distinct entity ids.
    #[default]
    Count,
    /// Sum of the value column, deduplicated per entity.
    Sum,
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Count => write!(f, "Count"),
            AggregationMode::Sum => write!(f, "Sum"),
        }
    }
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" => Ok(AggregationMode::Count),
            "sum" => Ok(AggregationMode::Sum),
            other => Err(format!("unknown aggregation mode '{}'", other)),
        }
    }
}

/// What to do when a rule names a tag absent from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTagPolicy {
    /// Fail with an unknown-tag error.
    #[default]
    Error,
    /// Treat the tag as absent for every entity.
    Ignore,
}

/// A bin x group matrix of counts or sums.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedTable {
    /// Row index (time bins).
    pub bins: Vec<i64>,
    /// Column labels (groups).
    pub groups: Vec<String>,
    /// Row-major cells, `values[bin][group]`.
    pub values: Vec<Vec<f64>>,
}

impl AggregatedTable {
    /// All-zero table over the given axes.
    pub fn zeros(bins: Vec<i64>, groups: Vec<String>) -> Self {
        let values = vec![vec![0.0; groups.len()]; bins.len()];
        Self {
            bins,
            groups,
            values,
        }
    }

    /// Look up one cell by labels.
    pub fn get(&self, bin: i64, group: &str) -> Option<f64> {
        let row = self.bins.iter().position(|b| *b == bin)?;
        let col = self.groups.iter().position(|g| g == group)?;
        Some(self.values[row][col])
    }

    /// One group's values down the bin axis.
    pub fn column(&self, group: &str) -> Option<Vec<f64>> {
        let col = self.groups.iter().position(|g| g == group)?;
        Some(self.values.iter().map(|row| row[col]).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty() || self.groups.is_empty()
    }
}

/// Per-bin aggregate ignoring group membership.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TotalSeries {
    pub bins: Vec<i64>,
    pub values: Vec<f64>,
}

impl TotalSeries {
    pub fn get(&self, bin: i64) -> Option<f64> {
        let row = self.bins.iter().position(|b| *b == bin)?;
        Some(self.values[row])
    }
}

/// Number of entities carrying one label after recategorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub entities: usize,
}

/// Metadata about a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Title shown at the top of the report.
    pub title: String,
    /// Source data file.
    pub data_source: String,
    /// Date and time of the run.
    pub generated_at: DateTime<Utc>,
    /// Rows after preprocessing (exploded).
    pub rows_preprocessed: usize,
    /// Rows left after filtering.
    pub rows_selected: usize,
    /// Distinct entities left after filtering.
    pub entities_selected: usize,
    /// Time-bin column of the x axis.
    pub time_bin_column: String,
    /// Value column (counted or summed).
    pub value_column: String,
    /// Grouping column, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groupby_column: Option<String>,
    pub mode: AggregationMode,
    pub cumulative: bool,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete output of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    /// Label distribution of the groupby column after recategorization.
    pub labels: Vec<LabelCount>,
    /// Dense grouped table (empty when no groupby column is used).
    pub aggregated: AggregatedTable,
    /// Dense total series.
    pub total: TotalSeries,
}
