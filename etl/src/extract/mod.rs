//! Change detection and extraction of source tables.

pub mod extractor;
pub mod prober;
pub mod query;
pub mod tracking;

pub use extractor::Extractor;
pub use prober::{SchemaProber, TableProbe};
pub use query::{ChangeFilter, ChangeQuery};
pub use tracking::{TrackingColumn, TrackingColumns};
