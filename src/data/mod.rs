//! Loading and cleaning tabular data.

pub mod preprocess;
pub mod table;

pub use preprocess::preprocess;
pub use table::{Dataset, Value};
