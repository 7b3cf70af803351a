use std::future::Future;

use crate::error::EtlResult;
use crate::extract::query::ChangeQuery;
use crate::types::{ChangeBatch, ColumnSchema, TableName};

/// Operational store rows are extracted from.
///
/// Implementations must be safe to call concurrently, one call per table pipeline.
pub trait Source {
    /// Returns the name of the source.
    fn name() -> &'static str;

    /// Returns the columns of `table` in ordinal order.
    ///
    /// A table missing from the catalog is an [`crate::error::ErrorKind::SourceSchemaError`],
    /// never an empty column list.
    fn table_columns(
        &self,
        table: &TableName,
    ) -> impl Future<Output = EtlResult<Vec<ColumnSchema>>> + Send;

    /// Runs a change query and materializes its result.
    ///
    /// The returned batch has exactly the columns listed by [`ChangeQuery::columns`]. It is
    /// empty when no row matches, which is not an error.
    fn fetch_changes(
        &self,
        query: &ChangeQuery,
    ) -> impl Future<Output = EtlResult<ChangeBatch>> + Send;
}
