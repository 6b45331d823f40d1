//! In-memory tabular data.
//!
//! A [`Dataset`] is an ordered list of named columns and rows of [`Value`]
//! cells. Every transformation returns a new dataset; inputs are never
//! modified in place.

use crate::error::{DashError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::Path;

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Empty cell.
    Missing,
    /// Numeric cell.
    Number(f64),
    /// Any other text.
    Text(String),
}

impl Value {
    /// Parse a raw CSV cell.
    ///
    /// Empty cells are missing, plain decimal literals are numbers and
    /// everything else (including zero-padded identifiers such as `007`)
    /// stays text so it displays back unchanged.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Missing;
        }

        if looks_numeric(trimmed) {
            if let Ok(n) = trimmed.parse::<f64>() {
                return Value::Number(n);
            }
        }

        Value::Text(raw.to_string())
    }

    /// Convenience constructor for text cells.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the cell; text is parsed if it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Missing => None,
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Integer view of the cell; fractional numbers yield `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// String key used for grouping and identity comparisons.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

fn looks_numeric(s: &str) -> bool {
    let bytes = s.as_bytes();
    let unsigned = bytes
        .strip_prefix(b"-")
        .or_else(|| bytes.strip_prefix(b"+"))
        .unwrap_or(bytes);

    // Zero-padded values are identifiers, not numbers.
    if unsigned.len() > 1 && unsigned[0] == b'0' && unsigned[1].is_ascii_digit() {
        return false;
    }

    unsigned.iter().any(u8::is_ascii_digit)
        && unsigned
            .iter()
            .all(|&b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'-' | b'+'))
}

/// An ordered table of named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Create an empty dataset with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a dataset from rows, checking that every row is full width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut dataset = Self::new(columns);
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Read a CSV document with a header row.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(false).from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
        let mut dataset = Self::new(columns);

        for record in rdr.records() {
            let record = record?;
            dataset
                .rows
                .push(record.iter().map(Value::parse).collect());
        }

        Ok(dataset)
    }

    /// Read a CSV file with a header row.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(io::BufReader::new(file))
    }

    /// Write the dataset as CSV, header first.
    pub fn to_writer<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Position of a column, or a consistency error if it is absent.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DashError::missing_column(name))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Append a row; its width must match the header.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(DashError::consistency(format!(
                "row has {} cells but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Keep the rows for which `keep` returns true.
    pub fn filter_rows<F>(&self, mut keep: F) -> Dataset
    where
        F: FnMut(&[Value]) -> bool,
    {
        Dataset {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// Replace a column's values, or append the column if it is new.
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> Result<Dataset> {
        if values.len() != self.rows.len() {
            return Err(DashError::consistency(format!(
                "column '{}' has {} values but the table has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        let mut out = self.clone();
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for (row, value) in out.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                out.columns.push(name.to_string());
                for (row, value) in out.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(out)
    }

    /// Rewrite one column cell by cell.
    pub fn map_column<F>(&self, name: &str, mut f: F) -> Result<Dataset>
    where
        F: FnMut(&Value) -> Value,
    {
        let idx = self.column_index(name)?;
        let mut out = self.clone();
        for row in &mut out.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(out)
    }

    /// Distinct ids in order of first appearance.
    pub fn distinct_ids(&self, id_column: &str) -> Result<Vec<String>> {
        let idx = self.column_index(id_column)?;
        let mut seen = HashSet::new();
        Ok(self
            .rows
            .iter()
            .map(|row| row[idx].key())
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }

    /// Left-join `other` on `key`, appending its remaining columns.
    ///
    /// Only the first row of `other` per key is used; unmatched rows get
    /// missing cells.
    pub fn left_join(&self, other: &Dataset, key: &str) -> Result<Dataset> {
        let left_key = self.column_index(key)?;
        let right_key = other.column_index(key)?;

        let appended: Vec<usize> = (0..other.columns.len())
            .filter(|&i| i != right_key)
            .collect();
        for &i in &appended {
            if self.has_column(&other.columns[i]) {
                return Err(DashError::consistency(format!(
                    "cannot join: column '{}' exists in both tables",
                    other.columns[i]
                )));
            }
        }

        let mut lookup: HashMap<String, &Vec<Value>> = HashMap::new();
        for row in &other.rows {
            lookup.entry(row[right_key].key()).or_insert(row);
        }

        let mut columns = self.columns.clone();
        columns.extend(appended.iter().map(|&i| other.columns[i].clone()));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut joined = row.clone();
                match lookup.get(&row[left_key].key()) {
                    Some(matched) => joined.extend(appended.iter().map(|&i| matched[i].clone())),
                    None => joined.extend(appended.iter().map(|_| Value::Missing)),
                }
                joined
            })
            .collect();

        Ok(Dataset { columns, rows })
    }

    /// Split a multi-valued column and duplicate each row once per value.
    ///
    /// Missing and numeric cells are kept as a single row.
    pub fn explode(&self, column: &str, delimiter: &str) -> Result<Dataset> {
        let idx = self.column_index(column)?;
        let mut rows = Vec::with_capacity(self.rows.len());

        for row in &self.rows {
            match &row[idx] {
                Value::Text(s) => {
                    for piece in s.split(delimiter) {
                        let mut exploded = row.clone();
                        exploded[idx] = if piece.is_empty() {
                            Value::Missing
                        } else {
                            Value::text(piece)
                        };
                        rows.push(exploded);
                    }
                }
                _ => rows.push(row.clone()),
            }
        }

        Ok(Dataset {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Tag set per id, splitting each cell on `delimiter`.
    ///
    /// Works on both exploded and unexploded tables, so comparing the two
    /// checks that explosion is loss-free.
    pub fn tag_sets(
        &self,
        id_column: &str,
        column: &str,
        delimiter: &str,
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let id_idx = self.column_index(id_column)?;
        let tag_idx = self.column_index(column)?;

        let mut sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in &self.rows {
            let entry = sets.entry(row[id_idx].key()).or_default();
            if let Value::Missing = row[tag_idx] {
                continue;
            }
            for tag in row[tag_idx].key().split(delimiter) {
                if !tag.is_empty() {
                    entry.insert(tag.to_string());
                }
            }
        }

        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let csv = "id,Title,Research Topics,Press Mentions\n\
                   1,Stars,Stars|Galaxies,3\n\
                   2,Planets,Exoplanets,\n\
                   007,Black holes,Black Holes|Stars|Galaxies,1.5\n";
        Dataset::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("2015"), Value::Number(2015.0));
        assert_eq!(Value::parse("-1.5"), Value::Number(-1.5));
        assert_eq!(Value::parse("007"), Value::text("007"));
        assert_eq!(Value::parse("N/A"), Value::text("N/A"));
        assert_eq!(Value::parse("inf"), Value::text("inf"));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(2015.0).to_string(), "2015");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Missing.to_string(), "");
    }

    #[test]
    fn test_value_numeric_views() {
        assert_eq!(Value::text(" 12 ").as_i64(), Some(12));
        assert_eq!(Value::Number(1.5).as_i64(), None);
        assert_eq!(Value::text("abc").as_f64(), None);
        assert_eq!(Value::Missing.as_f64(), None);
    }

    #[test]
    fn test_from_reader_and_writer() {
        let dataset = sample();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.columns()[2], "Research Topics");
        assert_eq!(dataset.rows()[1][3], Value::Missing);

        let mut out = Vec::new();
        dataset.to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("id,Title,Research Topics,Press Mentions\n"));
        assert!(text.contains("007,Black holes"));
    }

    #[test]
    fn test_column_index_missing() {
        let err = sample().column_index("Year").unwrap_err();
        assert!(matches!(err, DashError::DataConsistency { .. }));
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut dataset = Dataset::new(vec!["a".into(), "b".into()]);
        assert!(dataset.push_row(vec![Value::Missing]).is_err());
        assert!(dataset.push_row(vec![Value::Missing, Value::Missing]).is_ok());
    }

    #[test]
    fn test_explode_duplicates_rows() {
        let exploded = sample().explode("Research Topics", "|").unwrap();
        assert_eq!(exploded.len(), 6);
        let ids: Vec<String> = exploded
            .column_values("id")
            .unwrap()
            .iter()
            .map(|v| v.key())
            .collect();
        assert_eq!(ids, vec!["1", "1", "2", "007", "007", "007"]);
    }

    #[test]
    fn test_explode_round_trip_preserves_tag_sets() {
        let original = sample();
        let exploded = original.explode("Research Topics", "|").unwrap();

        let before = original.tag_sets("id", "Research Topics", "|").unwrap();
        let after = exploded.tag_sets("id", "Research Topics", "|").unwrap();
        assert_eq!(before, after);
        assert_eq!(after["007"].len(), 3);
    }

    #[test]
    fn test_distinct_ids_in_first_seen_order() {
        let exploded = sample().explode("Research Topics", "|").unwrap();
        assert_eq!(exploded.distinct_ids("id").unwrap(), vec!["1", "2", "007"]);
    }

    #[test]
    fn test_left_join() {
        let press = Dataset::from_reader("id,Press Types\n1,External Press\n1,Ignored\n".as_bytes())
            .unwrap();
        let joined = sample().left_join(&press, "id").unwrap();

        assert_eq!(joined.columns().last().unwrap(), "Press Types");
        assert_eq!(joined.rows()[0][4], Value::text("External Press"));
        assert_eq!(joined.rows()[1][4], Value::Missing);
    }

    #[test]
    fn test_left_join_rejects_column_collision() {
        let other = Dataset::from_reader("id,Title\n1,x\n".as_bytes()).unwrap();
        assert!(sample().left_join(&other, "id").is_err());
    }

    #[test]
    fn test_with_column_replaces_and_appends() {
        let dataset = sample();
        let replaced = dataset
            .with_column("Title", vec!["a".into(), "b".into(), "c".into()])
            .unwrap();
        assert_eq!(replaced.columns().len(), 4);
        assert_eq!(replaced.rows()[2][1], Value::text("c"));

        let appended = dataset
            .with_column("Year", vec![2015i64.into(), 2016i64.into(), 2017i64.into()])
            .unwrap();
        assert_eq!(appended.columns().len(), 5);
        assert!(dataset.with_column("Year", vec![]).is_err());
    }

    #[test]
    fn test_filter_rows_leaves_input_untouched() {
        let dataset = sample();
        let filtered = dataset.filter_rows(|row| row[0].key() == "2");
        assert_eq!(filtered.len(), 1);
        assert_eq!(dataset.len(), 3);
    }
}
