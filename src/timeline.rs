//! Time binning and x-axis views.
//!
//! Records carry a single date. This module turns it into calendar-year,
//! fiscal-year and month bins, and describes the x-axis views a plot can be
//! drawn over together with the full axis domain each view declares.

use crate::analysis::axis::AxisDomain;
use crate::config::TimeConfig;
use crate::data::Dataset;
use crate::error::{DashError, Result};
use chrono::{Datelike, Month, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date cell, accepting the formats exported by the usual sources.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// First day of the fiscal year, e.g. `September 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearStart {
    month: u32,
    day: u32,
}

impl YearStart {
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // 2000 is a leap year, so February 29 is accepted.
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(DashError::Config(format!(
                "invalid start of year: month {} day {}",
                month, day
            )));
        }
        Ok(Self { month, day })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Fiscal year label of `date`: the calendar year the fiscal year starts in.
    pub fn year_of(&self, date: NaiveDate) -> i32 {
        if (date.month(), date.day()) >= (self.month, self.day) {
            date.year()
        } else {
            date.year() - 1
        }
    }

    /// True when fiscal years coincide with calendar years.
    pub fn is_calendar(&self) -> bool {
        self.month == 1 && self.day == 1
    }
}

impl Default for YearStart {
    fn default() -> Self {
        Self { month: 1, day: 1 }
    }
}

impl FromStr for YearStart {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(month), Some(day), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(DashError::Config(format!(
                "start of year must look like 'September 1', got '{}'",
                s
            )));
        };

        let month: Month = month
            .parse()
            .map_err(|_| DashError::Config(format!("unknown month '{}'", month)))?;
        let day: u32 = day
            .parse()
            .map_err(|_| DashError::Config(format!("invalid day '{}'", day)))?;

        Self::new(month.number_from_month(), day)
    }
}

impl fmt::Display for YearStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Month::try_from(self.month as u8)
            .map(|m| m.name())
            .unwrap_or("January");
        write!(f, "{} {}", name, self.day)
    }
}

impl TryFrom<String> for YearStart {
    type Error = DashError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<YearStart> for String {
    fn from(start: YearStart) -> Self {
        start.to_string()
    }
}

/// X-axis definition for a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeView {
    /// One bin per calendar year.
    CalendarYear,
    /// One bin per fiscal year.
    #[default]
    FiscalYear,
    /// The twelve months of one calendar year.
    Months(i32),
    /// The twelve months of one fiscal year, in fiscal order.
    FiscalMonths(i32),
    /// The same calendar month across all years.
    Month(u32),
}

impl FromStr for TimeView {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            DashError::Config(format!(
                "unknown time view '{}' (expected calendar-year, fiscal-year, months:<year>, fiscal-months:<year> or month:<1-12>)",
                s
            ))
        };

        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
            None => (s.trim(), None),
        };

        match (kind, arg) {
            ("calendar-year", None) => Ok(TimeView::CalendarYear),
            ("fiscal-year", None) => Ok(TimeView::FiscalYear),
            ("months", Some(year)) => year.parse().map(TimeView::Months).map_err(|_| invalid()),
            ("fiscal-months", Some(year)) => {
                year.parse().map(TimeView::FiscalMonths).map_err(|_| invalid())
            }
            ("month", Some(month)) => match month.parse::<u32>() {
                Ok(m) if (1..=12).contains(&m) => Ok(TimeView::Month(m)),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for TimeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeView::CalendarYear => write!(f, "calendar-year"),
            TimeView::FiscalYear => write!(f, "fiscal-year"),
            TimeView::Months(year) => write!(f, "months:{}", year),
            TimeView::FiscalMonths(year) => write!(f, "fiscal-months:{}", year),
            TimeView::Month(month) => write!(f, "month:{}", month),
        }
    }
}

impl TryFrom<String> for TimeView {
    type Error = DashError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TimeView> for String {
    fn from(view: TimeView) -> Self {
        view.to_string()
    }
}

/// A resolved time view: which rows, which bin column, which axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TimePlan {
    pub view: TimeView,
    /// Column holding the bin of each row.
    pub bin_column: String,
    /// Every bin the x axis shows, in order.
    pub domain: AxisDomain,
    /// Keep only rows whose `(column, value)` matches.
    pub restrict: Option<(String, i64)>,
}

impl TimePlan {
    /// Resolve `view` against preprocessed data.
    ///
    /// Year ranges are taken from the whole dataset, so the axis stays the
    /// same whatever filters are applied later.
    pub fn new(view: TimeView, time: &TimeConfig, data: &Dataset) -> Result<Self> {
        let plan = match view {
            TimeView::CalendarYear => Self {
                view,
                bin_column: time.calendar_year_column.clone(),
                domain: year_range(data, &time.calendar_year_column)?,
                restrict: None,
            },
            TimeView::FiscalYear => Self {
                view,
                bin_column: time.fiscal_year_column.clone(),
                domain: year_range(data, &time.fiscal_year_column)?,
                restrict: None,
            },
            TimeView::Months(year) => Self {
                view,
                bin_column: time.month_column.clone(),
                domain: AxisDomain::CalendarMonths,
                restrict: Some((time.calendar_year_column.clone(), i64::from(year))),
            },
            TimeView::FiscalMonths(year) => {
                // Month bins cannot split a month between two fiscal years.
                if time.start_of_year.day() != 1 {
                    return Err(DashError::Config(format!(
                        "{} needs a fiscal year starting on the 1st, got {}",
                        view, time.start_of_year
                    )));
                }
                Self {
                    view,
                    bin_column: time.month_column.clone(),
                    domain: AxisDomain::fiscal_months(time.start_of_year.month())?,
                    restrict: Some((time.fiscal_year_column.clone(), i64::from(year))),
                }
            }
            TimeView::Month(month) => Self {
                view,
                bin_column: time.calendar_year_column.clone(),
                domain: year_range(data, &time.calendar_year_column)?,
                restrict: Some((time.month_column.clone(), i64::from(month))),
            },
        };
        Ok(plan)
    }

    /// Rows that belong on this view's axis.
    pub fn select(&self, data: &Dataset) -> Result<Dataset> {
        match &self.restrict {
            None => Ok(data.clone()),
            Some((column, value)) => {
                let idx = data.column_index(column)?;
                Ok(data.filter_rows(|row| row[idx].as_i64() == Some(*value)))
            }
        }
    }

    /// Human-readable axis label.
    pub fn axis_label(&self) -> String {
        match self.view {
            TimeView::CalendarYear => "Calendar Year".to_string(),
            TimeView::FiscalYear => "Fiscal Year".to_string(),
            TimeView::Months(year) => format!("Month ({})", year),
            TimeView::FiscalMonths(year) => format!("Month (fiscal year {})", year),
            TimeView::Month(month) => {
                let name = Month::try_from(month as u8)
                    .map(|m| m.name())
                    .unwrap_or("Month");
                format!("Year ({} only)", name)
            }
        }
    }
}

/// Every year from the smallest to the largest in `column`.
fn year_range(data: &Dataset, column: &str) -> Result<AxisDomain> {
    let years: Vec<i64> = data
        .column_values(column)?
        .into_iter()
        .filter_map(|v| v.as_i64())
        .collect();

    match (years.iter().min(), years.iter().max()) {
        (Some(&first), Some(&last)) => Ok(AxisDomain::Years { first, last }),
        _ => Ok(AxisDomain::Explicit(Vec::new())),
    }
}
