//! Staging-then-merge loading into the warehouse.

mod loader;

pub use loader::MergeLoader;
