//! Report and table export.
//!
//! This module writes the aggregated series as CSV and summarizes a run as a
//! Markdown or JSON report.

use crate::analysis::views::{column_totals, fractions, peak};
use crate::cli::OutputFormat;
use crate::data::{Dataset, Value};
use crate::models::{AggregatedTable, LabelCount, Report, ReportMetadata, TotalSeries};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Header of the per-bin total column in exported tables.
pub const TOTAL_COLUMN: &str = "Total";

/// Tag shared by all files of one run, e.g. `fiscal_year.id.press_types`.
pub fn file_tag(time_bin_column: &str, value_column: &str, groupby_column: Option<&str>) -> String {
    [time_bin_column, value_column, groupby_column.unwrap_or("total")]
        .iter()
        .map(|part| part.trim().to_lowercase().replace(' ', "_"))
        .collect::<Vec<_>>()
        .join(".")
}

fn format_number(n: f64) -> String {
    Value::Number(n).to_string()
}

/// Write the aggregated table with a trailing total column.
pub fn write_aggregated_csv<W: Write>(
    table: &AggregatedTable,
    total: &TotalSeries,
    time_bin_column: &str,
    writer: W,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec![time_bin_column.to_string()];
    header.extend(table.groups.iter().cloned());
    header.push(TOTAL_COLUMN.to_string());
    wtr.write_record(&header)?;

    for (r, bin) in total.bins.iter().enumerate() {
        let mut record = vec![bin.to_string()];
        for group in &table.groups {
            record.push(format_number(table.get(*bin, group).unwrap_or(0.0)));
        }
        record.push(format_number(total.values[r]));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# {}\n\n", report.metadata.title));

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Label distribution
    output.push_str(&generate_labels_section(&report.labels, &report.metadata));

    // Aggregated series
    output.push_str(&generate_table_section(report));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Data Source:** `{}`\n", metadata.data_source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Rows:** {} selected of {} preprocessed\n",
        metadata.rows_selected, metadata.rows_preprocessed
    ));
    section.push_str(&format!(
        "- **Entities Selected:** {}\n",
        metadata.entities_selected
    ));
    section.push_str(&format!(
        "- **Aggregation:** {} of `{}` per `{}`\n",
        metadata.mode, metadata.value_column, metadata.time_bin_column
    ));
    if let Some(ref groupby) = metadata.groupby_column {
        section.push_str(&format!("- **Grouped By:** `{}`\n", groupby));
    }
    if metadata.cumulative {
        section.push_str("- **Cumulative:** yes\n");
    }
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the label distribution section.
fn generate_labels_section(labels: &[LabelCount], metadata: &ReportMetadata) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Categories\n\n");
    if let Some(ref groupby) = metadata.groupby_column {
        section.push_str(&format!(
            "Each entity carries exactly one `{}` label after recategorization.\n\n",
            groupby
        ));
    }
    section.push_str("| Label | Entities |\n");
    section.push_str("|:---|:---:|\n");
    for label in labels {
        section.push_str(&format!("| {} | {} |\n", label.label, label.entities));
    }
    section.push('\n');

    section
}

/// Generate the aggregated table section.
fn generate_table_section(report: &Report) -> String {
    let mut section = String::new();
    let table = &report.aggregated;
    let total = &report.total;

    section.push_str("## Time Series\n\n");

    if total.bins.is_empty() {
        section.push_str("The declared time axis is empty.\n\n");
        return section;
    }

    section.push_str(&format!("| {} |", report.metadata.time_bin_column));
    for group in &table.groups {
        section.push_str(&format!(" {} |", group));
    }
    section.push_str(&format!(" **{}** |\n", TOTAL_COLUMN));

    section.push_str("|:---|");
    for _ in &table.groups {
        section.push_str("---:|");
    }
    section.push_str("---:|\n");

    for (r, bin) in total.bins.iter().enumerate() {
        section.push_str(&format!("| {} |", bin));
        for group in &table.groups {
            section.push_str(&format!(
                " {} |",
                format_number(table.get(*bin, group).unwrap_or(0.0))
            ));
        }
        section.push_str(&format!(" **{}** |\n", format_number(total.values[r])));
    }
    section.push('\n');

    if !table.groups.is_empty() {
        let totals = column_totals(table);
        if let Some((group, value)) = totals
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            section.push_str(&format!(
                "Largest group overall: **{}** ({}). Peak value: {}.\n\n",
                group,
                format_number(*value),
                format_number(peak(table, total))
            ));
        }

        section.push_str(
            "> Group columns can sum to more than the total when entities belong to \
             several groups; the total counts each entity once per bin.\n\n",
        );
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by PressDash v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write every export of a run into `dir`, returning the paths written.
pub fn write_outputs(
    report: &Report,
    selected: &Dataset,
    dir: &Path,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let metadata = &report.metadata;
    let tag = file_tag(
        &metadata.time_bin_column,
        &metadata.value_column,
        metadata.groupby_column.as_deref(),
    );
    let mut written = Vec::new();

    let path = dir.join(format!("aggregated.{}.csv", tag));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_aggregated_csv(&report.aggregated, &report.total, &metadata.time_bin_column, file)?;
    written.push(path);

    if metadata.groupby_column.is_some() {
        let shares = fractions(&report.aggregated);
        let shares_total = TotalSeries {
            bins: report.total.bins.clone(),
            values: shares.values.iter().map(|row| row.iter().sum()).collect(),
        };
        let path = dir.join(format!("shares.{}.csv", tag));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_aggregated_csv(&shares, &shares_total, &metadata.time_bin_column, file)?;
        written.push(path);
    }

    let path = dir.join(format!("data.{}.csv", tag));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    selected
        .to_writer(file)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path);

    let summary = match format {
        OutputFormat::Csv => None,
        OutputFormat::Markdown => Some(("md", generate_markdown_report(report))),
        OutputFormat::Json => Some(("json", generate_json_report(report)?)),
    };
    if let Some((ext, content)) = summary {
        let path = dir.join(format!("report.{}.{}", tag, ext));
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregationMode;
    use chrono::Utc;

    fn create_test_report() -> Report {
        let metadata = ReportMetadata {
            title: "Press Dashboard".to_string(),
            data_source: "data/press.2024.csv".to_string(),
            generated_at: Utc::now(),
            rows_preprocessed: 12,
            rows_selected: 9,
            entities_selected: 4,
            time_bin_column: "Fiscal Year".to_string(),
            value_column: "id".to_string(),
            groupby_column: Some("Press Types".to_string()),
            mode: AggregationMode::Count,
            cumulative: false,
            duration_seconds: 0.25,
        };

        Report {
            metadata,
            labels: vec![
                LabelCount {
                    label: "CIERA Press".to_string(),
                    entities: 3,
                },
                LabelCount {
                    label: "Other".to_string(),
                    entities: 1,
                },
            ],
            aggregated: AggregatedTable {
                bins: vec![2015, 2016],
                groups: vec!["CIERA Press".to_string(), "Other".to_string()],
                values: vec![vec![2.0, 1.0], vec![1.0, 0.0]],
            },
            total: TotalSeries {
                bins: vec![2015, 2016],
                values: vec![3.0, 1.0],
            },
        }
    }

    #[test]
    fn test_file_tag() {
        assert_eq!(
            file_tag("Fiscal Year", "id", Some("Press Types")),
            "fiscal_year.id.press_types"
        );
        assert_eq!(file_tag("Month", "Press Mentions", None), "month.press_mentions.total");
    }

    #[test]
    fn test_write_aggregated_csv() {
        let report = create_test_report();
        let mut out = Vec::new();
        write_aggregated_csv(&report.aggregated, &report.total, "Fiscal Year", &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Fiscal Year,CIERA Press,Other,Total");
        assert_eq!(lines[1], "2015,2,1,3");
        assert_eq!(lines[2], "2016,1,0,1");
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report());

        assert!(markdown.contains("# Press Dashboard"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Categories"));
        assert!(markdown.contains("| CIERA Press | 3 |"));
        assert!(markdown.contains("| 2015 | 2 | 1 | **3** |"));
        assert!(markdown.contains("Largest group overall: **CIERA Press** (3)"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let report = create_test_report();
        let section = generate_metadata_section(&report.metadata);

        assert!(section.contains("data/press.2024.csv"));
        assert!(section.contains("9 selected of 12"));
        assert!(section.contains("Count of `id` per `Fiscal Year`"));
        assert!(!section.contains("Cumulative"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"aggregated\""));
        assert!(json.contains("\"mode\": \"count\""));
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let selected = Dataset::from_reader("id,Press Types\n1,CIERA Press\n".as_bytes()).unwrap();

        let written =
            write_outputs(&create_test_report(), &selected, dir.path(), OutputFormat::Markdown)
                .unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "aggregated.fiscal_year.id.press_types.csv",
                "shares.fiscal_year.id.press_types.csv",
                "data.fiscal_year.id.press_types.csv",
                "report.fiscal_year.id.press_types.md",
            ]
        );
        assert!(written.iter().all(|p| p.exists()));

        let shares = std::fs::read_to_string(&written[1]).unwrap();
        let lines: Vec<&str> = shares.lines().collect();
        assert_eq!(lines[0], "Fiscal Year,CIERA Press,Other,Total");
        assert_eq!(lines[2], "2016,1,0,1");
    }

    #[test]
    fn test_write_outputs_without_groups_skips_shares() {
        let dir = tempfile::tempdir().unwrap();
        let selected = Dataset::from_reader("id\n1\n".as_bytes()).unwrap();
        let mut report = create_test_report();
        report.metadata.groupby_column = None;

        let written = write_outputs(&report, &selected, dir.path(), OutputFormat::Csv).unwrap();
        assert_eq!(written.len(), 2);
        assert!(!dir.path().join("shares.fiscal_year.id.total.csv").exists());
    }
}
