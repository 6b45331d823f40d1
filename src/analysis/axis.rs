//! Axis domains and sparse-to-dense normalization.
//!
//! Pivoting only yields the bins and groups that occur in the data. Plots
//! expect the same axes on every render, so aggregated tables are reindexed
//! onto a caller-declared domain: declared order is kept, absent entries are
//! zero-filled and undeclared entries are dropped with a warning.

use crate::error::{DashError, Result};
use crate::models::{AggregatedTable, TotalSeries};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use tracing::warn;

/// The full, ordered set of time bins a plot should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisDomain {
    /// Months 1 through 12.
    CalendarMonths,
    /// Months 1 through 12, starting at `start` and wrapping around.
    FiscalMonths { start: u32 },
    /// Every year from `first` to `last` inclusive.
    Years { first: i64, last: i64 },
    /// Any other ordered list of bins.
    Explicit(Vec<i64>),
}

impl AxisDomain {
    /// Fiscal months starting at `start`, which must be a month number.
    pub fn fiscal_months(start: u32) -> Result<Self> {
        if !(1..=12).contains(&start) {
            return Err(DashError::Config(format!(
                "fiscal year must start in month 1-12, got {}",
                start
            )));
        }
        Ok(AxisDomain::FiscalMonths { start })
    }

    /// The bins of this domain, in declared order.
    pub fn values(&self) -> Vec<i64> {
        match self {
            AxisDomain::CalendarMonths => (1..=12).collect(),
            AxisDomain::FiscalMonths { start } => {
                let start = i64::from(*start);
                (0..12).map(|offset| (start - 1 + offset) % 12 + 1).collect()
            }
            AxisDomain::Years { first, last } => (*first..=*last).collect(),
            AxisDomain::Explicit(values) => values.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AxisDomain::CalendarMonths | AxisDomain::FiscalMonths { .. } => 12,
            AxisDomain::Years { first, last } if last >= first => (last - first + 1) as usize,
            AxisDomain::Years { .. } => 0,
            AxisDomain::Explicit(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// For each declared key, the position of that key in `present`.
pub fn align<K: Eq + Hash>(present: &[K], declared: &[K]) -> Vec<Option<usize>> {
    let positions: HashMap<&K, usize> = present.iter().enumerate().map(|(i, k)| (k, i)).collect();
    declared.iter().map(|k| positions.get(k).copied()).collect()
}

/// Keys that occur in `present` but not in `declared`.
pub fn undeclared<'a, K: Eq + Hash>(present: &'a [K], declared: &[K]) -> Vec<&'a K> {
    present.iter().filter(|k| !declared.contains(k)).collect()
}

fn warn_dropped<K: Display + Eq + Hash>(axis: &str, present: &[K], declared: &[K]) {
    let dropped = undeclared(present, declared);
    if !dropped.is_empty() {
        let listed: Vec<String> = dropped.iter().map(|k| k.to_string()).collect();
        warn!(
            "Dropping {} {} outside the declared domain: {}",
            dropped.len(),
            axis,
            listed.join(", ")
        );
    }
}

/// Reindex a grouped table onto declared bins and (optionally) groups.
///
/// With `groups` absent the table keeps the groups it already has.
pub fn reindex_table(table: &AggregatedTable, bins: &[i64], groups: Option<&[String]>) -> AggregatedTable {
    let groups: Vec<String> = match groups {
        Some(declared) => declared.to_vec(),
        None => table.groups.clone(),
    };

    warn_dropped("bins", &table.bins, bins);
    warn_dropped("groups", &table.groups, &groups);

    let row_map = align(&table.bins, bins);
    let col_map = align(&table.groups, &groups);

    let values = row_map
        .iter()
        .map(|row| {
            col_map
                .iter()
                .map(|col| match (row, col) {
                    (Some(r), Some(c)) => table.values[*r][*c],
                    _ => 0.0,
                })
                .collect()
        })
        .collect();

    AggregatedTable {
        bins: bins.to_vec(),
        groups,
        values,
    }
}

/// Reindex a total series onto declared bins.
pub fn reindex_total(total: &TotalSeries, bins: &[i64]) -> TotalSeries {
    warn_dropped("bins", &total.bins, bins);

    let values = align(&total.bins, bins)
        .into_iter()
        .map(|row| row.map(|r| total.values[r]).unwrap_or(0.0))
        .collect();

    TotalSeries {
        bins: bins.to_vec(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse_table() -> AggregatedTable {
        AggregatedTable {
            bins: vec![1, 10],
            groups: vec!["A".to_string(), "C".to_string()],
            values: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        }
    }

    #[test]
    fn test_calendar_months() {
        assert_eq!(AxisDomain::CalendarMonths.values(), (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_fiscal_months_wrap_around() {
        let domain = AxisDomain::fiscal_months(9).unwrap();
        assert_eq!(domain.values(), vec![9, 10, 11, 12, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(domain.len(), 12);
    }

    #[test]
    fn test_fiscal_months_rejects_bad_start() {
        assert!(AxisDomain::fiscal_months(0).is_err());
        assert!(AxisDomain::fiscal_months(13).is_err());
    }

    #[test]
    fn test_years() {
        let domain = AxisDomain::Years {
            first: 2014,
            last: 2016,
        };
        assert_eq!(domain.values(), vec![2014, 2015, 2016]);
        let empty = AxisDomain::Years {
            first: 2016,
            last: 2014,
        };
        assert!(empty.is_empty());
        assert!(empty.values().is_empty());
    }

    #[test]
    fn test_align() {
        let present = vec!["b", "a"];
        let declared = vec!["a", "x", "b"];
        assert_eq!(align(&present, &declared), vec![Some(1), None, Some(0)]);
        assert_eq!(undeclared(&["a", "z"], &declared), vec![&"z"]);
    }

    #[test]
    fn test_reindex_keeps_declared_order_and_zero_fills() {
        let domain = AxisDomain::fiscal_months(9).unwrap().values();
        let groups = vec!["C".to_string(), "B".to_string(), "A".to_string()];
        let dense = reindex_table(&sparse_table(), &domain, Some(&groups));

        assert_eq!(dense.bins, domain);
        assert_eq!(dense.groups, groups);
        assert_eq!(dense.values.len(), 12);
        // Month 10 is the second fiscal month, month 1 the fifth.
        assert_eq!(dense.values[1], vec![4.0, 0.0, 3.0]);
        assert_eq!(dense.values[4], vec![2.0, 0.0, 1.0]);
        assert_eq!(dense.values[0], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reindex_without_group_domain_keeps_groups() {
        let dense = reindex_table(&sparse_table(), &[10, 11], None);
        assert_eq!(dense.groups, vec!["A", "C"]);
        assert_eq!(dense.values, vec![vec![3.0, 4.0], vec![0.0, 0.0]]);
    }

    #[test]
    fn test_reindex_total() {
        let total = TotalSeries {
            bins: vec![2016, 2014],
            values: vec![5.0, 2.0],
        };
        let dense = reindex_total(&total, &[2014, 2015, 2016]);
        assert_eq!(dense.values, vec![2.0, 0.0, 5.0]);
    }
}
