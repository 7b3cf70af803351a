//! Incremental sync engine moving changed rows from Postgres into an analytical warehouse.
//!
//! A run reads the watermark, extracts every configured table's rows changed since then, shapes
//! them with the table's [`transform::Transform`], stages them in the warehouse and merges them
//! into the destination table by primary key. The watermark only advances when every table
//! succeeded, so a failed table is retried from the same point on the next run.
//!
//! The entry point is [`pipeline::SyncPipeline`], built from a [`pipeline::SyncContext`] holding
//! the [`source::Source`], [`warehouse::Warehouse`] and [`watermark::WatermarkStore`].

pub mod conversions;
pub mod error;
pub mod extract;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod load;
mod macros;
pub mod pipeline;
pub mod retry;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod warehouse;
pub mod watermark;
