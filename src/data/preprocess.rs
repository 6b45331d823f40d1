//! Cleaning raw exports into an exploded, time-binned dataset.

use super::table::{Dataset, Value};
use crate::config::{DataConfig, TimeConfig};
use crate::error::{DashError, Result};
use crate::timeline::parse_date;
use chrono::Datelike;
use tracing::{debug, info, warn};

/// Run every cleaning step, in order, returning a new dataset.
pub fn preprocess(raw: &Dataset, data: &DataConfig, time: &TimeConfig) -> Result<Dataset> {
    let mut ds = exclude_years(raw, data)?;
    ds = drop_incomplete(&ds, &data.required_columns)?;
    ds = unescape_ampersands(&ds, data)?;
    ds = add_time_bins(&ds, data, time)?;
    ds = fill_missing(&ds, data)?;
    for grouping in &data.groupings {
        ds = ds.explode(grouping, &data.tag_delimiter)?;
    }

    info!(
        "Preprocessed {} raw rows into {} exploded rows ({} groupings)",
        raw.len(),
        ds.len(),
        data.groupings.len()
    );
    Ok(ds)
}

fn dates_of(ds: &Dataset, data: &DataConfig) -> Result<Vec<chrono::NaiveDate>> {
    let date_idx = ds.column_index(&data.date_column)?;
    let id_idx = ds.column_index(&data.id_column)?;

    let mut dates = Vec::with_capacity(ds.len());
    let mut bad_ids = Vec::new();
    for row in ds.rows() {
        match parse_date(&row[date_idx].key()) {
            Some(date) => dates.push(date),
            None => bad_ids.push(row[id_idx].key()),
        }
    }

    if !bad_ids.is_empty() {
        return Err(DashError::consistency_with_ids(
            format!("unparseable dates in column '{}'", data.date_column),
            bad_ids,
        ));
    }
    Ok(dates)
}

/// Drop draft records dated in an excluded year.
fn exclude_years(ds: &Dataset, data: &DataConfig) -> Result<Dataset> {
    if data.exclude_years.is_empty() {
        return Ok(ds.clone());
    }

    let date_idx = ds.column_index(&data.date_column)?;
    let kept = ds.filter_rows(|row| {
        parse_date(&row[date_idx].key())
            .map(|date| !data.exclude_years.contains(&date.year()))
            .unwrap_or(true)
    });

    if kept.len() < ds.len() {
        debug!(
            "Dropped {} rows dated in excluded years {:?}",
            ds.len() - kept.len(),
            data.exclude_years
        );
    }
    Ok(kept)
}

/// Drop rows missing any required column.
fn drop_incomplete(ds: &Dataset, required: &[String]) -> Result<Dataset> {
    let indices = required
        .iter()
        .map(|c| ds.column_index(c))
        .collect::<Result<Vec<_>>>()?;

    let kept = ds.filter_rows(|row| indices.iter().all(|&i| !row[i].is_missing()));
    if kept.len() < ds.len() {
        warn!(
            "Dropped {} rows missing one of {}",
            ds.len() - kept.len(),
            required.join(", ")
        );
    }
    Ok(kept)
}

/// Replace `&amp;` with `&` in text and grouping columns.
fn unescape_ampersands(ds: &Dataset, data: &DataConfig) -> Result<Dataset> {
    let mut out = ds.clone();
    for column in data.text_columns.iter().chain(&data.groupings) {
        if !out.has_column(column) {
            debug!("Text column '{}' not present, skipping unescape", column);
            continue;
        }
        out = out.map_column(column, |value| match value {
            Value::Text(s) if s.contains("&amp;") => Value::Text(s.replace("&amp;", "&")),
            other => other.clone(),
        })?;
    }
    Ok(out)
}

/// Append calendar-year, fiscal-year and month columns.
fn add_time_bins(ds: &Dataset, data: &DataConfig, time: &TimeConfig) -> Result<Dataset> {
    let dates = dates_of(ds, data)?;

    let calendar = dates.iter().map(|d| Value::from(i64::from(d.year()))).collect();
    let fiscal = dates
        .iter()
        .map(|d| Value::from(i64::from(time.start_of_year.year_of(*d))))
        .collect();
    let month = dates.iter().map(|d| Value::from(i64::from(d.month()))).collect();

    ds.with_column(&time.calendar_year_column, calendar)?
        .with_column(&time.fiscal_year_column, fiscal)?
        .with_column(&time.month_column, month)
}

/// Zero-fill numerical columns and label every other missing cell.
fn fill_missing(ds: &Dataset, data: &DataConfig) -> Result<Dataset> {
    let numerical: Vec<bool> = ds
        .columns()
        .iter()
        .map(|c| data.numerical_columns.contains(c))
        .collect();

    let rows = ds
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .zip(&numerical)
                .map(|(value, &is_numerical)| match value {
                    Value::Missing if is_numerical => Value::Number(0.0),
                    Value::Missing => Value::text(data.missing_label.as_str()),
                    other => other.clone(),
                })
                .collect()
        })
        .collect();

    Dataset::from_rows(ds.columns().to_vec(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> Dataset {
        let csv = "id,Title,Date,Press Types,Research Topics,Press Mentions\n\
                   1,Stars &amp; Planets,2015-09-03,CIERA Press|Northwestern Press,Stars|Planets,4\n\
                   2,Draft,1970-01-01,CIERA Press,Stars,\n\
                   3,,2016-02-01,CIERA Press,Stars,1\n\
                   4,Quiet month,2016-08-31,External Press,,\n";
        Dataset::from_reader(csv.as_bytes()).unwrap()
    }

    fn config() -> (DataConfig, TimeConfig) {
        let data = DataConfig {
            groupings: vec!["Press Types".to_string(), "Research Topics".to_string()],
            numerical_columns: vec!["Press Mentions".to_string()],
            ..DataConfig::default()
        };
        let time = TimeConfig {
            start_of_year: "September 1".parse().unwrap(),
            ..TimeConfig::default()
        };
        (data, time)
    }

    fn column(ds: &Dataset, name: &str) -> Vec<String> {
        ds.column_values(name)
            .unwrap()
            .iter()
            .map(|v| v.key())
            .collect()
    }

    #[test]
    fn test_preprocess_steps() {
        let (data, time) = config();
        let ds = preprocess(&raw(), &data, &time).unwrap();

        // Id 2 is a 1970 draft, id 3 has no title; id 1 explodes 2x2.
        assert_eq!(column(&ds, "id"), vec!["1", "1", "1", "1", "4"]);
        assert_eq!(column(&ds, "Title")[0], "Stars & Planets");
        assert_eq!(column(&ds, "Fiscal Year"), vec!["2015", "2015", "2015", "2015", "2015"]);
        assert_eq!(column(&ds, "Calendar Year")[4], "2016");
        assert_eq!(column(&ds, "Month")[4], "8");
        assert_eq!(column(&ds, "Research Topics")[4], "N/A");
        assert_eq!(ds.rows()[4][5], Value::Number(0.0));
    }

    #[test]
    fn test_explosion_is_loss_free() {
        let (data, time) = config();
        let ds = preprocess(&raw(), &data, &time).unwrap();
        let sets = ds.tag_sets("id", "Press Types", "|").unwrap();
        let expected = raw().tag_sets("id", "Press Types", "|").unwrap();
        assert_eq!(sets["1"], expected["1"]);
        assert_eq!(sets["4"], expected["4"]);
    }

    #[test]
    fn test_unparseable_date_names_ids() {
        let (data, time) = config();
        let csv = "id,Title,Date,Press Types,Research Topics\n9,Odd,someday,CIERA Press,Stars\n";
        let bad = Dataset::from_reader(csv.as_bytes()).unwrap();
        let err = preprocess(&bad, &data, &time).unwrap_err();
        assert!(err.to_string().contains("ids: 9"));
    }

    #[test]
    fn test_missing_grouping_column() {
        let (mut data, time) = config();
        data.groupings.push("Categories".to_string());
        assert!(matches!(
            preprocess(&raw(), &data, &time),
            Err(DashError::DataConsistency { .. })
        ));
    }
}
