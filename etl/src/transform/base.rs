use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{LoadBatch, TableBatch};

/// Extracted batches handed to a transform, keyed by source table name.
pub type TransformInputs = HashMap<String, TableBatch>;

/// Shapes extracted batches into the column contract of one destination table.
///
/// Transforms are pure: the same inputs always produce the same batch and no I/O happens.
pub trait Transform: fmt::Debug + Send + Sync {
    /// Names of the source tables this transform reads, in join order.
    fn inputs(&self) -> &[String];

    /// Produces the load batch. Every input listed by [`Transform::inputs`] is present and
    /// non-empty when this is called.
    fn apply(&self, inputs: &TransformInputs) -> EtlResult<LoadBatch>;
}

/// Runs `transform` for the destination `table`.
///
/// Returns an empty batch without calling the transform when any required input is empty.
/// Failures are reported as [`ErrorKind::TransformFailed`] with the underlying error as cause.
pub fn run_transform(
    table: &str,
    transform: &dyn Transform,
    inputs: &TransformInputs,
) -> EtlResult<LoadBatch> {
    for input in transform.inputs() {
        match inputs.get(input) {
            Some(batch) if batch.is_empty() => {
                debug!(table, input = %input, "input batch is empty, skipping transform");
                return Ok(TableBatch::default());
            }
            Some(_) => {}
            None => {
                let cause = etl_error!(
                    ErrorKind::InvalidState,
                    "Transform input was not extracted",
                    format!("input `{input}` is missing")
                );
                return Err(etl_error!(
                    ErrorKind::TransformFailed,
                    "Transform failed",
                    detail = format!("table {table}"),
                    source: cause
                ));
            }
        }
    }

    transform.apply(inputs).map_err(|err| {
        etl_error!(
            ErrorKind::TransformFailed,
            "Transform failed",
            detail = format!("table {table}"),
            source: err
        )
    })
}
