//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `pressdash.yml` (or `.yaml`/`.toml`) files.

use crate::cli::{Args, OutputFormat};
use crate::error::DashError;
use crate::filter::{Filters, SearchFilter};
use crate::models::{AggregationMode, UnknownTagPolicy};
use crate::rules::{CategoryRule, GroupingTarget, RuleSet};
use crate::timeline::{TimeView, YearStart};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File names searched for in the working directory.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["pressdash.yml", "pressdash.yaml", "pressdash.toml"];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input data settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Time binning settings.
    #[serde(default)]
    pub time: TimeConfig,

    /// Rule sets keyed by grouping column, applied in order.
    #[serde(default)]
    pub new_categories: IndexMap<String, RuleSet>,

    /// Row selection applied before aggregation.
    #[serde(default)]
    pub filters: Filters,

    /// Aggregation defaults.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Export settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the data lives and how to clean it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory searched for data files.
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Wildcard pattern for the main data file; the newest match is used.
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    /// Explicit data file, bypassing the directory search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<String>,

    /// Wildcard pattern for a second table joined on the id column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplementary_file_pattern: Option<String>,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_date_column")]
    pub date_column: String,

    /// Multi-valued tag columns, exploded in this order.
    #[serde(default = "default_groupings")]
    pub groupings: Vec<String>,

    #[serde(default = "default_tag_delimiter")]
    pub tag_delimiter: String,

    /// Columns whose missing cells become 0.
    #[serde(default = "default_numerical_columns")]
    pub numerical_columns: Vec<String>,

    /// Columns with HTML-escaped ampersands.
    #[serde(default = "default_text_columns")]
    pub text_columns: Vec<String>,

    /// Rows missing any of these are dropped.
    #[serde(default = "default_required_columns")]
    pub required_columns: Vec<String>,

    /// Years holding draft records.
    #[serde(default = "default_exclude_years")]
    pub exclude_years: Vec<i32>,

    /// Fill value for missing non-numeric cells.
    #[serde(default = "default_missing_label")]
    pub missing_label: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            file_pattern: default_file_pattern(),
            data_file: None,
            supplementary_file_pattern: None,
            id_column: default_id_column(),
            date_column: default_date_column(),
            groupings: default_groupings(),
            tag_delimiter: default_tag_delimiter(),
            numerical_columns: default_numerical_columns(),
            text_columns: default_text_columns(),
            required_columns: default_required_columns(),
            exclude_years: default_exclude_years(),
            missing_label: default_missing_label(),
        }
    }
}

fn default_input_dir() -> String {
    "./data".to_string()
}

fn default_file_pattern() -> String {
    "press.*.csv".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_date_column() -> String {
    "Date".to_string()
}

fn default_groupings() -> Vec<String> {
    vec!["Research Topics", "Press Types", "Categories"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_tag_delimiter() -> String {
    "|".to_string()
}

fn default_numerical_columns() -> Vec<String> {
    vec!["Press Mentions", "People Reached"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_text_columns() -> Vec<String> {
    vec!["Title".to_string()]
}

fn default_required_columns() -> Vec<String> {
    vec!["Title", "Press Types"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_exclude_years() -> Vec<i32> {
    vec![1970]
}

fn default_missing_label() -> String {
    "N/A".to_string()
}

/// Time binning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// First day of the fiscal year.
    #[serde(default = "default_start_of_year")]
    pub start_of_year: YearStart,

    #[serde(default = "default_calendar_year_column")]
    pub calendar_year_column: String,

    #[serde(default = "default_fiscal_year_column")]
    pub fiscal_year_column: String,

    #[serde(default = "default_month_column")]
    pub month_column: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            start_of_year: default_start_of_year(),
            calendar_year_column: default_calendar_year_column(),
            fiscal_year_column: default_fiscal_year_column(),
            month_column: default_month_column(),
        }
    }
}

fn default_start_of_year() -> YearStart {
    YearStart::default()
}

fn default_calendar_year_column() -> String {
    "Calendar Year".to_string()
}

fn default_fiscal_year_column() -> String {
    "Fiscal Year".to_string()
}

fn default_month_column() -> String {
    "Month".to_string()
}

/// Aggregation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub time_view: TimeView,

    /// Column counted or summed; counts default to the id column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groupby_column: Option<String>,

    #[serde(default)]
    pub mode: AggregationMode,

    /// Label single-tag entities "Other" instead of by their tag.
    #[serde(default)]
    pub combine_single_categories: bool,

    /// Rule tags absent from the data: `error` or `ignore`.
    #[serde(default)]
    pub unknown_tags: UnknownTagPolicy,

    /// Use running totals down the time axis.
    #[serde(default)]
    pub cumulative: bool,

    /// Apply `new_categories` before aggregating.
    #[serde(default = "default_true")]
    pub recategorize: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            time_view: TimeView::default(),
            value_column: None,
            groupby_column: None,
            mode: AggregationMode::default(),
            combine_single_categories: false,
            unknown_tags: UnknownTagPolicy::default(),
            cumulative: false,
            recategorize: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default = "default_page_title")]
    pub page_title: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
            page_title: default_page_title(),
        }
    }
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_page_title() -> String {
    "Press Dashboard".to_string()
}

/// Configuration file syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Yaml,
    Toml,
}

impl Syntax {
    fn of(path: &Path) -> Syntax {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Syntax::Toml,
            _ => Syntax::Yaml,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = match Syntax::of(path) {
            Syntax::Toml => Self::from_toml_str(&content),
            Syntax::Yaml => Self::from_yaml_str(&content),
        }
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Try to load configuration from the working directory.
    ///
    /// Returns `Ok(None)` if no file exists, `Err` if one exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Load the first of [`DEFAULT_CONFIG_FILES`] found in `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        match DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
        {
            Some(path) => Ok(Some(Self::load(&path)?)),
            None => Ok(None),
        }
    }

    /// Check settings that serde cannot.
    pub fn validate(&self) -> crate::error::Result<()> {
        let data = &self.data;
        for (name, value) in [
            ("data.id_column", &data.id_column),
            ("data.date_column", &data.date_column),
            ("data.tag_delimiter", &data.tag_delimiter),
        ] {
            if value.is_empty() {
                return Err(DashError::Config(format!("{} must not be empty", name)));
            }
        }

        for (key, rules) in self.new_categories.iter() {
            let target = GroupingTarget::parse(key)?;
            if !data.groupings.contains(&target.source_column) {
                return Err(DashError::Config(format!(
                    "new categories for '{}' need '{}' to be listed in data.groupings",
                    key, target.source_column
                )));
            }
            rules.validate()?;
        }

        if self.aggregation.mode == AggregationMode::Sum && self.aggregation.value_column.is_none() {
            return Err(DashError::Config(
                "sum aggregation needs aggregation.value_column".to_string(),
            ));
        }

        self.filters.validate()
    }

    /// Column counted or summed.
    pub fn value_column(&self) -> &str {
        self.aggregation
            .value_column
            .as_deref()
            .unwrap_or(&self.data.id_column)
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) -> Result<()> {
        if let Some(ref data) = args.data {
            self.data.data_file = Some(data.display().to_string());
        }

        if let Some(view) = args.time_view {
            self.aggregation.time_view = view;
        }
        if let Some(ref value) = args.value {
            self.aggregation.value_column = Some(value.clone());
        }
        if let Some(ref groupby) = args.groupby {
            self.aggregation.groupby_column = Some(groupby.clone());
        }
        if let Some(mode) = args.mode {
            self.aggregation.mode = mode;
        }
        if let Some(policy) = args.unknown_tags {
            self.aggregation.unknown_tags = policy;
        }

        // Flags always override
        if args.combine_single_categories {
            self.aggregation.combine_single_categories = true;
        }
        if args.no_recategorize {
            self.aggregation.recategorize = false;
        }
        if args.cumulative {
            self.aggregation.cumulative = true;
        }

        for (column, values) in args.categorical_filters().map_err(anyhow::Error::msg)? {
            self.filters.categorical.insert(column, values);
        }
        for (column, range) in args.range_filters().map_err(anyhow::Error::msg)? {
            self.filters.numerical.insert(column, range);
        }
        if let Some((column, pattern)) = args.search_filter().map_err(anyhow::Error::msg)? {
            self.filters.search = Some(SearchFilter { column, pattern });
        }

        if let Some(ref dir) = args.output_dir {
            self.output.dir = dir.display().to_string();
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }

        self.validate().context("Invalid settings after applying CLI arguments")?;
        Ok(())
    }

    /// A starting configuration with an example rule set.
    pub fn example() -> Self {
        let mut config = Config::default();
        config.time.start_of_year = YearStart::new(9, 1).unwrap_or_default();
        config.aggregation.groupby_column = Some("Press Types".to_string());
        config.new_categories.insert(
            "Press Types".to_string(),
            [CategoryRule::new(
                "Northwestern Press (Inclusive)",
                "'Northwestern Press' | ('Northwestern Press' & 'CIERA Press')",
            )]
            .into_iter()
            .collect(),
        );
        config
    }

    /// Generate a default configuration file content.
    pub fn default_yaml() -> String {
        serde_yaml::to_string(&Config::example()).unwrap_or_default()
    }
}
