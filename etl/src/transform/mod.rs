//! Pure shaping of extracted batches into destination batches.

mod base;
pub mod builtin;
pub mod ops;
mod registry;

pub use base::{Transform, TransformInputs, run_transform};
pub use registry::TransformRegistry;
