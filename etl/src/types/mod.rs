//! Data types flowing through a sync run.

mod batch;
mod cell;
mod table_row;

pub use batch::*;
pub use cell::*;
pub use table_row::*;

pub use crate::conversions::numeric::PgNumeric;
pub use postgres::schema::{ColumnSchema, DEFAULT_SCHEMA, TableName};
pub use tokio_postgres::types::Type;
