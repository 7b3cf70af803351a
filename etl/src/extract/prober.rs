use tracing::debug;

use crate::error::EtlResult;
use crate::extract::tracking::TrackingColumns;
use crate::source::Source;
use crate::types::{ColumnSchema, TableName};

/// Columns of a source table and the tracking columns among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProbe {
    columns: Vec<ColumnSchema>,
    tracking: TrackingColumns,
}

impl TableProbe {
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn tracking(&self) -> &TrackingColumns {
        &self.tracking
    }
}

/// Reads the catalog of a [`Source`] to find which tracking columns a table has.
#[derive(Debug)]
pub struct SchemaProber<'a, S> {
    source: &'a S,
}

impl<'a, S> SchemaProber<'a, S>
where
    S: Source,
{
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Probes `table`. Catalog and connectivity errors are returned as is.
    pub async fn probe(&self, table: &TableName) -> EtlResult<TableProbe> {
        let columns = self.source.table_columns(table).await?;
        let tracking = TrackingColumns::from_columns(&columns);

        debug!(%table, columns = columns.len(), ?tracking, "probed source table");

        Ok(TableProbe { columns, tracking })
    }
}

#[cfg(test)]
mod tests {
    use tokio_postgres::types::Type;

    use super::*;
    use crate::error::ErrorKind;
    use crate::extract::tracking::TrackingColumn;
    use crate::source::memory::MemorySource;
    use crate::types::TableBatch;

    #[tokio::test]
    async fn reports_tracking_columns_of_existing_table() {
        let source = MemorySource::new();
        source
            .insert_table(
                TableName::public("products"),
                TableBatch::empty(vec![
                    ColumnSchema::new("id", Type::INT8, false),
                    ColumnSchema::new("created_at", Type::TIMESTAMPTZ, false),
                    ColumnSchema::new("deleted_at", Type::TIMESTAMPTZ, true),
                ]),
            )
            .await;

        let probe = SchemaProber::new(&source)
            .probe(&TableName::public("products"))
            .await
            .unwrap();

        assert_eq!(probe.columns().len(), 3);
        assert!(probe.tracking().contains(TrackingColumn::CreatedAt));
        assert!(!probe.tracking().contains(TrackingColumn::UpdatedAt));
        assert!(probe.tracking().contains(TrackingColumn::DeletedAt));
    }

    #[tokio::test]
    async fn missing_table_is_a_schema_error() {
        let source = MemorySource::new();

        let err = SchemaProber::new(&source)
            .probe(&TableName::public("missing"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceSchemaError);
    }
}
