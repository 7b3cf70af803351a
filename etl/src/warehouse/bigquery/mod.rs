mod client;
mod encoding;

pub use client::{BigQueryWarehouse, table_descriptor};
pub use encoding::BigQueryTableRow;
