//! Analytical warehouses receiving merged rows.

mod base;
#[cfg(feature = "bigquery")]
pub mod bigquery;
pub mod memory;

pub use base::*;
