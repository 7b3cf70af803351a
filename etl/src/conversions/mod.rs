//! Conversions from Postgres wire values into [`crate::types::Cell`]s.

pub mod numeric;
pub mod row;
