//! Time-binned counts and sums.
//!
//! This module pivots selected rows into a bin x group table plus a per-bin
//! total, then reindexes both onto the declared axis domain.

use super::axis::{reindex_table, reindex_total};
use crate::data::{Dataset, Value};
use crate::error::{DashError, Result};
use crate::models::{AggregatedTable, AggregationMode, TotalSeries};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Columns and mode of one aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub id_column: String,
    pub time_bin_column: String,
    /// Rows missing this value are not counted; in sum mode it is summed.
    pub value_column: String,
    /// Without a grouping column only the total is produced.
    pub groupby_column: Option<String>,
    pub mode: AggregationMode,
}

struct Columns {
    id: usize,
    bin: usize,
    value: usize,
    group: Option<usize>,
}

impl Columns {
    fn resolve(rows: &Dataset, request: &AggregateRequest) -> Result<Self> {
        Ok(Self {
            id: rows.column_index(&request.id_column)?,
            bin: rows.column_index(&request.time_bin_column)?,
            value: rows.column_index(&request.value_column)?,
            group: request
                .groupby_column
                .as_deref()
                .map(|c| rows.column_index(c))
                .transpose()?,
        })
    }
}

/// A row's time bin; missing bins are skipped.
fn bin_of(row: &[Value], cols: &Columns, column: &str) -> Result<Option<i64>> {
    match &row[cols.bin] {
        Value::Missing => Ok(None),
        value => value.as_i64().map(Some).ok_or_else(|| {
            DashError::consistency_with_ids(
                format!("time bin column '{}' holds non-integer value '{}'", column, value),
                vec![row[cols.id].key()],
            )
        }),
    }
}

fn numeric_value(value: &Value, column: &str) -> Result<f64> {
    match value {
        Value::Missing => Ok(0.0),
        other => other.as_f64().ok_or_else(|| DashError::TypeConsistency {
            column: column.to_string(),
            value: other.key(),
        }),
    }
}

/// Sparse pivot: only bins and groups present in `rows`, both sorted.
///
/// Counts are distinct ids per (bin, group) among rows whose value column
/// is present; the total counts each id once per bin. Sums keep the first
/// row per (id, group) and, for the total, the first row per id.
pub fn aggregate(rows: &Dataset, request: &AggregateRequest) -> Result<(AggregatedTable, TotalSeries)> {
    let cols = Columns::resolve(rows, request)?;
    let mut skipped = 0usize;

    let mut cells: BTreeMap<(i64, String), f64> = BTreeMap::new();
    let mut totals: BTreeMap<i64, f64> = BTreeMap::new();
    let mut groups: BTreeSet<String> = BTreeSet::new();

    match request.mode {
        AggregationMode::Count => {
            let mut seen_cells: HashSet<(i64, String, String)> = HashSet::new();
            let mut seen_totals: HashSet<(i64, String)> = HashSet::new();

            for row in rows.rows() {
                let Some(bin) = bin_of(row, &cols, &request.time_bin_column)? else {
                    skipped += 1;
                    continue;
                };
                if row[cols.value].is_missing() {
                    continue;
                }
                let id = row[cols.id].key();

                if let Some(g) = cols.group {
                    let group = row[g].key();
                    groups.insert(group.clone());
                    let cell = cells.entry((bin, group.clone())).or_default();
                    if seen_cells.insert((bin, group, id.clone())) {
                        *cell += 1.0;
                    }
                }

                let total = totals.entry(bin).or_default();
                if seen_totals.insert((bin, id)) {
                    *total += 1.0;
                }
            }
        }
        AggregationMode::Sum => {
            let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
            let mut seen_ids: HashSet<String> = HashSet::new();

            for row in rows.rows() {
                let amount = numeric_value(&row[cols.value], &request.value_column)?;
                let Some(bin) = bin_of(row, &cols, &request.time_bin_column)? else {
                    skipped += 1;
                    continue;
                };
                let id = row[cols.id].key();

                if let Some(g) = cols.group {
                    let group = row[g].key();
                    groups.insert(group.clone());
                    let cell = cells.entry((bin, group.clone())).or_default();
                    if seen_pairs.insert((id.clone(), group)) {
                        *cell += amount;
                    }
                }

                let total = totals.entry(bin).or_default();
                if seen_ids.insert(id) {
                    *total += amount;
                }
            }
        }
    }

    if skipped > 0 {
        debug!("Skipped {} rows without a time bin", skipped);
    }

    let bins: Vec<i64> = totals.keys().copied().collect();
    let groups: Vec<String> = groups.into_iter().collect();
    let mut table = AggregatedTable::zeros(bins.clone(), groups.clone());
    for (r, bin) in bins.iter().enumerate() {
        for (c, group) in groups.iter().enumerate() {
            if let Some(v) = cells.get(&(*bin, group.clone())) {
                table.values[r][c] = *v;
            }
        }
    }

    let total = TotalSeries {
        bins,
        values: totals.into_values().collect(),
    };

    debug!(
        "{} aggregation of '{}': {} bins x {} groups from {} rows",
        request.mode,
        request.value_column,
        table.bins.len(),
        table.groups.len(),
        rows.len()
    );
    Ok((table, total))
}

/// Reindex a table and its total onto the declared domain.
pub fn normalize(
    table: &AggregatedTable,
    total: &TotalSeries,
    bins: &[i64],
    groups: Option<&[String]>,
) -> (AggregatedTable, TotalSeries) {
    (reindex_table(table, bins, groups), reindex_total(total, bins))
}

/// Aggregate and normalize in one step.
pub fn aggregate_dense(
    rows: &Dataset,
    request: &AggregateRequest,
    bins: &[i64],
    groups: Option<&[String]>,
) -> Result<(AggregatedTable, TotalSeries)> {
    let (table, total) = aggregate(rows, request)?;
    Ok(normalize(&table, &total, bins, groups))
}
