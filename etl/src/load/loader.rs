use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio_postgres::types::Type;
use tracing::{debug, error, info, warn};

#[cfg(feature = "failpoints")]
use crate::failpoints::{LOAD_AFTER_STAGING, LOAD_BEFORE_TRUNCATE, etl_fail_point};

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::{bail, etl_error};
use crate::retry::RetryPolicy;
use crate::types::{Cell, ColumnSchema, LoadBatch, TableBatch, TableRow};
use crate::warehouse::{
    MergeStatement, SEQUENCE_COLUMN, TableRef, Warehouse, WarehouseLayout, WarehouseStatement,
};

/// Staging-then-merge loader.
///
/// A load appends the batch to the table's staging relation, merges staging into the destination
/// by primary key and truncates staging. Only the append is retried.
#[derive(Debug)]
pub struct MergeLoader<'a, W> {
    warehouse: &'a W,
    layout: &'a WarehouseLayout,
    retry: RetryPolicy,
}

impl<'a, W> MergeLoader<'a, W>
where
    W: Warehouse,
{
    pub fn new(warehouse: &'a W, layout: &'a WarehouseLayout, retry: RetryPolicy) -> Self {
        Self {
            warehouse,
            layout,
            retry,
        }
    }

    /// Upserts `batch` into `table` keyed by `primary_key` and returns the number of rows staged.
    ///
    /// Every failure is an [`ErrorKind::LoadFailed`] whose source is the failing step's error.
    pub async fn load(&self, table: &str, primary_key: &str, batch: &LoadBatch) -> EtlResult<usize> {
        if batch.is_empty() {
            info!(table, "no rows to load");
            return Ok(0);
        }

        batch
            .require_column(primary_key)
            .map_err(|err| load_failed(table, err))?;

        let staging = self.layout.staging(table);
        let destination = self.layout.destination(table);
        let staged = sequenced(batch).map_err(|err| load_failed(table, err))?;

        let staging_result = self
            .retry
            .run("stage", || self.stage(&staging, &destination, batch, &staged))
            .await;
        if let Err(err) = staging_result {
            if let Err(truncate_err) = self.truncate(&staging).await {
                warn!(%staging, error = %truncate_err, "failed to clear staging after a failed append");
            }
            return Err(load_failed(table, err));
        }

        #[cfg(feature = "failpoints")]
        etl_fail_point(LOAD_AFTER_STAGING).map_err(|err| load_failed(table, err))?;

        let merge = WarehouseStatement::Merge(MergeStatement {
            target: destination.clone(),
            staging: staging.clone(),
            primary_key: primary_key.to_string(),
            columns: batch.column_names().map(str::to_string).collect(),
        });
        let merge_result = self.warehouse.run_statement(&merge).await;
        let truncate_result = self.truncate(&staging).await;

        match (merge_result, truncate_result) {
            (Ok(()), Ok(())) => {
                info!(table = %destination, rows = batch.len(), "merged rows into destination");
                Ok(batch.len())
            }
            (Err(err), truncate_result) => {
                if let Err(truncate_err) = truncate_result {
                    error!(%staging, error = %truncate_err, "failed to truncate staging after a failed merge");
                }
                Err(load_failed(table, err))
            }
            (Ok(()), Err(err)) => Err(load_failed(table, err)),
        }
    }

    async fn stage(
        &self,
        staging: &TableRef,
        destination: &TableRef,
        batch: &LoadBatch,
        staged: &TableBatch,
    ) -> EtlResult<()> {
        self.warehouse
            .run_statement(&WarehouseStatement::CreateTableIfMissing {
                table: staging.clone(),
                columns: staged.columns().to_vec(),
            })
            .await?;
        self.warehouse
            .run_statement(&WarehouseStatement::CreateTableIfMissing {
                table: destination.clone(),
                columns: batch.columns().to_vec(),
            })
            .await?;

        debug!(%staging, rows = staged.len(), "appending rows to staging");

        self.warehouse.load_rows(staging, staged).await
    }

    async fn truncate(&self, staging: &TableRef) -> EtlResult<()> {
        #[cfg(feature = "failpoints")]
        etl_fail_point(LOAD_BEFORE_TRUNCATE)?;

        self.warehouse
            .run_statement(&WarehouseStatement::Truncate(staging.clone()))
            .await
    }
}

/// Last staging time handed out by [`next_staged_at`], in microseconds.
static LAST_STAGED_AT: AtomicU64 = AtomicU64::new(0);

/// Returns the current time in microseconds, strictly greater than any value returned before in
/// this process even when the wall clock steps back.
fn next_staged_at() -> u64 {
    let now = Utc::now().timestamp_micros().max(0) as u64;
    let previous = LAST_STAGED_AT
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or_else(|last| last);

    now.max(previous.saturating_add(1))
}

/// Appends the [`SEQUENCE_COLUMN`] to every row of `batch`.
///
/// Values sort by staging time first, then by position in the batch, so rows left behind by an
/// earlier attempt lose against the rows of this one. Staging times only increase within a
/// process; across processes the order follows the wall clock.
fn sequenced(batch: &LoadBatch) -> EtlResult<TableBatch> {
    if batch.column_index(SEQUENCE_COLUMN).is_some() {
        bail!(
            ErrorKind::InvalidData,
            "Batch already carries the reserved sequence column",
            format!("column `{SEQUENCE_COLUMN}`")
        );
    }

    let staged_at = next_staged_at();

    let mut columns = batch.columns().to_vec();
    columns.push(ColumnSchema::new(SEQUENCE_COLUMN, Type::TEXT, false));

    let rows = batch
        .rows()
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mut row: TableRow = row.clone();
            row.push(Cell::String(format!("{staged_at:016x}{index:016x}")));
            row
        })
        .collect();

    TableBatch::new(columns, rows)
}

fn load_failed(table: &str, cause: EtlError) -> EtlError {
    etl_error!(
        ErrorKind::LoadFailed,
        "Load failed",
        detail = format!("table {table}"),
        source: cause
    )
}
