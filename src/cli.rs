//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::filter::Range;
use crate::models::{AggregationMode, UnknownTagPolicy};
use crate::timeline::TimeView;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// PressDash - recategorize, filter and aggregate press records
///
/// Loads the newest press/grant export, collapses multi-tag categories into
/// one label per record, and writes plot-ready time series as CSV plus a
/// Markdown or JSON summary.
///
/// Examples:
///   pressdash --config pressdash.yml
///   pressdash --groupby "Press Types" --time-view fiscal-months:2016
///   pressdash --mode sum --value "Press Mentions" --cumulative
///   pressdash --filter "Press Types=CIERA Press,External Press" --search "Title=black hole"
///   pressdash --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for pressdash.yml, pressdash.yaml or
    /// pressdash.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "PRESSDASH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data file to load instead of the newest match in data.input_dir
    #[arg(short, long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// X axis: calendar-year, fiscal-year, months:<year>, fiscal-months:<year> or month:<1-12>
    #[arg(short, long, value_name = "VIEW")]
    pub time_view: Option<TimeView>,

    /// Column to count or sum
    #[arg(long, value_name = "COLUMN")]
    pub value: Option<String>,

    /// Column to split the time series by
    #[arg(short, long, value_name = "COLUMN")]
    pub groupby: Option<String>,

    /// Aggregation mode (count, sum)
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<AggregationMode>,

    /// Label single-tag records "Other" instead of by their tag
    #[arg(long)]
    pub combine_single_categories: bool,

    /// Skip the configured new categories
    #[arg(long)]
    pub no_recategorize: bool,

    /// What to do with rule tags absent from the data
    #[arg(long, value_name = "POLICY", value_parser = parse_policy)]
    pub unknown_tags: Option<UnknownTagPolicy>,

    /// Keep rows whose column holds one of the listed values (repeatable)
    ///
    /// Example: --filter "Press Types=CIERA Press,External Press"
    #[arg(long = "filter", value_name = "COLUMN=A,B")]
    pub filters: Vec<String>,

    /// Keep rows whose column lies in an inclusive range (repeatable)
    ///
    /// Example: --range "Press Mentions=1:100"
    #[arg(long = "range", value_name = "COLUMN=MIN:MAX")]
    pub ranges: Vec<String>,

    /// Case-insensitive regex search on one column
    ///
    /// Example: --search "Title=black hole"
    #[arg(long, value_name = "COLUMN=PATTERN")]
    pub search: Option<String>,

    /// Use running totals down the time axis
    #[arg(long)]
    pub cumulative: bool,

    /// Directory for the exported files
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Report format (csv, json, markdown)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default pressdash.yml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CSV tables only
    Csv,
    /// Markdown summary (default)
    #[default]
    Markdown,
    /// JSON summary
    Json,
}

fn parse_policy(s: &str) -> Result<UnknownTagPolicy, String> {
    match s.to_lowercase().as_str() {
        "error" => Ok(UnknownTagPolicy::Error),
        "ignore" => Ok(UnknownTagPolicy::Ignore),
        other => Err(format!("unknown policy '{}' (expected error or ignore)", other)),
    }
}

fn split_assignment<'a>(flag: &str, raw: &'a str) -> Result<(&'a str, &'a str), String> {
    match raw.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => Ok((column.trim(), value)),
        _ => Err(format!("{} expects COLUMN=VALUE, got '{}'", flag, raw)),
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// `--filter` values as (column, allowed values).
    pub fn categorical_filters(&self) -> Result<Vec<(String, Vec<String>)>, String> {
        self.filters
            .iter()
            .map(|raw| {
                let (column, values) = split_assignment("--filter", raw)?;
                let values: Vec<String> = values
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
                Ok((column.to_string(), values))
            })
            .collect()
    }

    /// `--range` values as (column, range).
    pub fn range_filters(&self) -> Result<Vec<(String, Range)>, String> {
        self.ranges
            .iter()
            .map(|raw| {
                let (column, bounds) = split_assignment("--range", raw)?;
                let parsed = bounds
                    .split_once(':')
                    .and_then(|(min, max)| Some((min.trim().parse::<f64>().ok()?, max.trim().parse::<f64>().ok()?)));
                match parsed {
                    Some((min, max)) => Ok((column.to_string(), Range { min, max })),
                    None => Err(format!("--range expects COLUMN=MIN:MAX, got '{}'", raw)),
                }
            })
            .collect()
    }

    /// `--search` value as (column, pattern).
    pub fn search_filter(&self) -> Result<Option<(String, String)>, String> {
        self.search
            .as_deref()
            .map(|raw| {
                split_assignment("--search", raw)
                    .map(|(column, pattern)| (column.to_string(), pattern.to_string()))
            })
            .transpose()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref data) = self.data {
            if !data.is_file() {
                return Err(format!("Data file does not exist: {}", data.display()));
            }
        }

        if let Some(ref config) = self.config {
            if !config.is_file() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        self.categorical_filters()?;
        for (column, range) in self.range_filters()? {
            if range.min > range.max {
                return Err(format!(
                    "Range for '{}' has min {} above max {}",
                    column, range.min, range.max
                ));
            }
        }
        self.search_filter()?;

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            data: None,
            time_view: None,
            value: None,
            groupby: None,
            mode: None,
            combine_single_categories: false,
            no_recategorize: false,
            unknown_tags: None,
            filters: Vec::new(),
            ranges: Vec::new(),
            search: None,
            cumulative: false,
            output_dir: None,
            format: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "pressdash",
            "--time-view",
            "fiscal-months:2016",
            "--mode",
            "sum",
            "--unknown-tags",
            "ignore",
            "--format",
            "json",
        ]);
        assert_eq!(args.time_view, Some(TimeView::FiscalMonths(2016)));
        assert_eq!(args.mode, Some(AggregationMode::Sum));
        assert_eq!(args.unknown_tags, Some(UnknownTagPolicy::Ignore));
        assert_eq!(args.format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_bad_time_view_is_rejected() {
        assert!(Args::try_parse_from(["pressdash", "--time-view", "weekly"]).is_err());
    }

    #[test]
    fn test_filter_parsing() {
        let mut args = make_args();
        args.filters = vec!["Press Types=CIERA Press, External Press".to_string()];
        args.ranges = vec!["Press Mentions=0:12.5".to_string()];
        args.search = Some("Title=black|hole".to_string());

        let categorical = args.categorical_filters().unwrap();
        assert_eq!(categorical[0].0, "Press Types");
        assert_eq!(categorical[0].1, vec!["CIERA Press", "External Press"]);

        let ranges = args.range_filters().unwrap();
        assert_eq!(ranges[0].1, Range { min: 0.0, max: 12.5 });

        // Only the first '=' separates the column from the pattern.
        assert_eq!(
            args.search_filter().unwrap(),
            Some(("Title".to_string(), "black|hole".to_string()))
        );
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_bad_filters() {
        let mut args = make_args();
        args.ranges = vec!["Press Mentions=5".to_string()];
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.ranges = vec!["Press Mentions=5:1".to_string()];
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.filters = vec!["=CIERA Press".to_string()];
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_data_file() {
        let mut args = make_args();
        args.data = Some(PathBuf::from("/definitely/not/here.csv"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
