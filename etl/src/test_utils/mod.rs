pub mod database;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod fixtures;
pub mod pipeline;
