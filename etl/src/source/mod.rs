//! Operational stores rows are extracted from.

mod base;
pub mod memory;
pub mod postgres;

pub use base::Source;
