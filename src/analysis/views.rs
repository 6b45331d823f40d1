//! Derived views of aggregated tables used by the plots.

use crate::models::{AggregatedTable, TotalSeries};

/// Running sums down the bin axis.
pub fn cumulative(table: &AggregatedTable) -> AggregatedTable {
    let mut out = table.clone();
    for r in 1..out.values.len() {
        for c in 0..out.groups.len() {
            out.values[r][c] += out.values[r - 1][c];
        }
    }
    out
}

/// Running sums of a total series.
pub fn cumulative_total(total: &TotalSeries) -> TotalSeries {
    let mut running = 0.0;
    TotalSeries {
        bins: total.bins.clone(),
        values: total
            .values
            .iter()
            .map(|v| {
                running += v;
                running
            })
            .collect(),
    }
}

/// Each cell as a fraction of its row sum; zero rows stay zero.
pub fn fractions(table: &AggregatedTable) -> AggregatedTable {
    let mut out = table.clone();
    for row in &mut out.values {
        let sum: f64 = row.iter().sum();
        for cell in row.iter_mut() {
            *cell = if sum == 0.0 { 0.0 } else { *cell / sum };
        }
    }
    out
}

/// Sum of each group over all bins.
pub fn column_totals(table: &AggregatedTable) -> Vec<(String, f64)> {
    table
        .groups
        .iter()
        .enumerate()
        .map(|(c, group)| (group.clone(), table.values.iter().map(|row| row[c]).sum()))
        .collect()
}

/// Largest value in the table or total, for y-axis limits.
pub fn peak(table: &AggregatedTable, total: &TotalSeries) -> f64 {
    table
        .values
        .iter()
        .flatten()
        .chain(total.values.iter())
        .copied()
        .fold(0.0, f64::max)
}
