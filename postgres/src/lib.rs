//! Postgres helpers shared by the sync engine and the syncer binary.

pub mod schema;
#[cfg(feature = "sqlx")]
pub mod sqlx;
pub mod types;
