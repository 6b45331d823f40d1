//! PressDash - recategorize multi-valued tags and aggregate records into
//! plot-ready time series.
//!
//! Records such as press mentions or grants carry `|`-delimited tags. The
//! pipeline cleans them, relabels every entity with exactly one category
//! from boolean rules over its tag set, filters them, and counts or sums
//! them per time bin and group on a fixed axis.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod models;
pub mod pipeline;
pub mod recategorize;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod timeline;

pub use error::{DashError, Result};
