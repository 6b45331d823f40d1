//! Row selection.
//!
//! A text search, categorical allow-lists and inclusive numeric ranges,
//! all conjoined.

use crate::data::{Dataset, Value};
use crate::error::{DashError, Result};
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Case-insensitive regular-expression search on one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub column: String,
    pub pattern: String,
}

/// Inclusive numeric range, written `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn contains(&self, n: f64) -> bool {
        self.min <= n && n <= self.max
    }
}

impl From<[f64; 2]> for Range {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

impl From<Range> for [f64; 2] {
    fn from(range: Range) -> Self {
        [range.min, range.max]
    }
}

/// Selection criteria applied before aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchFilter>,

    /// Column -> values a row may hold.
    #[serde(default)]
    pub categorical: IndexMap<String, Vec<String>>,

    /// Column -> inclusive range.
    #[serde(default)]
    pub numerical: IndexMap<String, Range>,
}

enum Criterion {
    Search(usize, Regex),
    Allowed(usize, HashSet<String>),
    Within(usize, Range),
}

impl Criterion {
    fn keeps(&self, row: &[Value]) -> bool {
        match self {
            // Missing cells never match a search.
            Criterion::Search(idx, re) => match &row[*idx] {
                Value::Missing => false,
                value => re.is_match(&value.key()),
            },
            Criterion::Allowed(idx, allowed) => allowed.contains(&row[*idx].key()),
            Criterion::Within(idx, range) => row[*idx]
                .as_f64()
                .map(|n| range.contains(n))
                .unwrap_or(false),
        }
    }
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.categorical.is_empty() && self.numerical.is_empty()
    }

    /// Values allowed for `column`, if it has a categorical filter.
    pub fn allowed(&self, column: &str) -> Option<&[String]> {
        self.categorical.get(column).map(Vec::as_slice)
    }

    /// Check patterns and ranges without touching any data.
    pub fn validate(&self) -> Result<()> {
        if let Some(search) = &self.search {
            compile_search(&search.pattern)?;
        }
        for (column, range) in self.numerical.iter() {
            if range.min > range.max {
                return Err(DashError::Config(format!(
                    "range for '{}' has min {} above max {}",
                    column, range.min, range.max
                )));
            }
        }
        Ok(())
    }

    /// Rows matching every criterion.
    pub fn apply(&self, data: &Dataset) -> Result<Dataset> {
        let mut criteria = Vec::new();

        if let Some(search) = &self.search {
            if !search.pattern.is_empty() {
                let idx = data.column_index(&search.column)?;
                criteria.push(Criterion::Search(idx, compile_search(&search.pattern)?));
            }
        }
        for (column, values) in self.categorical.iter() {
            let idx = data.column_index(column)?;
            criteria.push(Criterion::Allowed(idx, values.iter().cloned().collect()));
        }
        for (column, range) in self.numerical.iter() {
            let idx = data.column_index(column)?;
            criteria.push(Criterion::Within(idx, *range));
        }

        let selected = data.filter_rows(|row| criteria.iter().all(|c| c.keeps(row)));
        debug!(
            "Filters kept {} of {} rows ({} criteria)",
            selected.len(),
            data.len(),
            criteria.len()
        );
        Ok(selected)
    }
}

fn compile_search(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| DashError::Config(format!("invalid search pattern '{}': {}", pattern, e)))
}
