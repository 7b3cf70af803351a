use std::fmt;

use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::storage::{
    BatchAppendResult, ColumnMode, ColumnType, FieldDescriptor, StorageApiConfig, StreamName,
    TableBatch as StorageBatch, TableDescriptor,
};
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use gcp_bigquery_client::{Client, error::BQError, model::query_request::QueryRequest};
use prost::Message;
use tokio_postgres::types::Type;
use tracing::{debug, info};

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::types::{ColumnSchema, TableBatch};
use crate::warehouse::base::{TableRef, Warehouse, WarehouseStatement};
use crate::warehouse::bigquery::encoding::BigQueryTableRow;
use crate::{bail, etl_error};

/// Trace identifier attached to Storage Write API requests.
const ETL_TRACE_ID: &str = "ETL BigQueryWarehouse";

/// Inflight append requests allowed per pooled connection.
const MAX_INFLIGHT_REQUESTS_PER_CONNECTION: usize = 100;

/// [`Warehouse`] backed by BigQuery.
///
/// Statements run as query jobs, rows are appended to the default stream of the table through the
/// Storage Write API.
#[derive(Clone)]
pub struct BigQueryWarehouse {
    project_id: String,
    client: Client,
}

impl BigQueryWarehouse {
    /// Authenticates with a service account key given as JSON.
    pub async fn new_with_key(
        project_id: impl Into<String>,
        sa_key: &str,
        connection_pool_size: usize,
    ) -> EtlResult<BigQueryWarehouse> {
        let storage_config = StorageApiConfig {
            connection_pool_size,
            max_inflight_requests: connection_pool_size
                .saturating_mul(MAX_INFLIGHT_REQUESTS_PER_CONNECTION),
        };

        let sa_key = parse_service_account_key(sa_key).map_err(BQError::from)?;
        let client = ClientBuilder::new()
            .with_storage_config(storage_config)
            .build_from_service_account_key(sa_key, false)
            .await?;

        Ok(BigQueryWarehouse {
            project_id: project_id.into(),
            client,
        })
    }

    async fn query(&self, sql: String) -> EtlResult<()> {
        debug!(%sql, "running bigquery query");

        self.client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await?;

        Ok(())
    }
}

/// Builds the Storage Write API descriptor of `columns`.
///
/// Types without a native protobuf mapping are sent as strings and parsed by BigQuery.
pub fn table_descriptor(columns: &[ColumnSchema]) -> TableDescriptor {
    let field_descriptors = (1..)
        .zip(columns)
        .map(|(number, column)| {
            let typ = match column.typ {
                Type::BOOL => ColumnType::Bool,
                Type::INT2 | Type::INT4 => ColumnType::Int32,
                Type::INT8 => ColumnType::Int64,
                Type::FLOAT4 => ColumnType::Float,
                Type::FLOAT8 => ColumnType::Double,
                Type::BYTEA => ColumnType::Bytes,
                _ => ColumnType::String,
            };
            let mode = if column.nullable {
                ColumnMode::Nullable
            } else {
                ColumnMode::Required
            };

            FieldDescriptor {
                number,
                name: column.name.clone(),
                typ,
                mode,
            }
        })
        .collect();

    TableDescriptor { field_descriptors }
}

fn check_append_result(table: &TableRef, result: BatchAppendResult) -> EtlResult<()> {
    let mut errors: Vec<EtlError> = Vec::new();

    for response in result.responses {
        match response {
            Ok(response) => {
                for row_error in response.row_errors {
                    errors.push(etl_error!(
                        ErrorKind::DestinationError,
                        "BigQuery rejected a row",
                        format!("{table}: {row_error:?}")
                    ));
                }
            }
            Err(status) => errors.push(BQError::from(status).into()),
        }
    }

    if errors.is_empty() {
        return Ok(());
    }

    Err(errors.into())
}

impl Warehouse for BigQueryWarehouse {
    fn name() -> &'static str {
        "bigquery"
    }

    async fn load_rows(&self, table: &TableRef, batch: &TableBatch) -> EtlResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let rows = batch
            .rows()
            .iter()
            .cloned()
            .map(BigQueryTableRow)
            .collect::<Vec<_>>();
        let encoded_len: usize = rows.iter().map(Message::encoded_len).sum();

        let stream_name = StreamName::new_default(
            table.project_id.clone(),
            table.dataset_id.clone(),
            table.table_id.clone(),
        );
        let storage_batch =
            StorageBatch::new(stream_name, table_descriptor(batch.columns()), rows);

        let results = self
            .client
            .storage()
            .append_table_batches_concurrent(vec![storage_batch], ETL_TRACE_ID)
            .await?;

        if results.is_empty() {
            bail!(
                ErrorKind::DestinationError,
                "BigQuery returned no append result",
                format!("table {table}")
            );
        }
        for result in results {
            check_append_result(table, result)?;
        }

        info!(%table, rows = batch.len(), bytes = encoded_len, "appended rows to bigquery");

        Ok(())
    }

    async fn run_statement(&self, statement: &WarehouseStatement) -> EtlResult<()> {
        if let WarehouseStatement::CreateTableIfMissing { table, .. } = statement {
            info!(%table, "ensuring bigquery table exists");
        }

        self.query(statement.to_sql()).await
    }
}

impl fmt::Debug for BigQueryWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryWarehouse")
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_numbers_fields_in_column_order() {
        let descriptor = table_descriptor(&[
            ColumnSchema::new("id", Type::INT8, false),
            ColumnSchema::new("price", Type::NUMERIC, true),
        ]);

        let fields = &descriptor.field_descriptors;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].number, 1);
        assert_eq!(fields[0].name, "id");
        assert!(matches!(fields[0].typ, ColumnType::Int64));
        assert!(matches!(fields[0].mode, ColumnMode::Required));
        assert!(matches!(fields[1].typ, ColumnType::String));
        assert!(matches!(fields[1].mode, ColumnMode::Nullable));
    }
}
