//! Aggregation, axis normalization and derived views.

pub mod aggregator;
pub mod axis;
pub mod views;

pub use aggregator::*;
pub use axis::AxisDomain;
