//! Persistence of the extraction watermark.

mod base;
pub mod memory;
pub mod postgres;

pub use base::{WatermarkStore, format_watermark, parse_watermark};
