use chrono::{DateTime, Utc};
use tracing::{info, warn};

#[cfg(feature = "failpoints")]
use crate::failpoints::{EXTRACT_BEFORE_QUERY, etl_fail_point};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::extract::prober::SchemaProber;
use crate::extract::query::{ChangeFilter, ChangeQuery};
use crate::retry::RetryPolicy;
use crate::source::Source;
use crate::types::{ChangeBatch, TableName};

/// Extracts the rows of a source table changed since a watermark.
#[derive(Debug)]
pub struct Extractor<'a, S> {
    source: &'a S,
    retry: RetryPolicy,
    max_rows: u64,
}

impl<'a, S> Extractor<'a, S>
where
    S: Source,
{
    /// Creates an extractor returning at most `max_rows` rows per table.
    pub fn new(source: &'a S, retry: RetryPolicy, max_rows: u64) -> Self {
        Self {
            source,
            retry,
            max_rows,
        }
    }

    /// Returns the rows of `table` changed at or after `watermark`.
    ///
    /// The probe and the query are retried together on transient errors. Any final failure,
    /// including a result larger than the row bound, is an [`ErrorKind::ExtractionFailed`] whose
    /// source is the underlying error.
    pub async fn extract(
        &self,
        table: &TableName,
        track_deletes: bool,
        watermark: DateTime<Utc>,
    ) -> EtlResult<ChangeBatch> {
        let batch = self
            .retry
            .run("extract", move || {
                self.extract_once(table, track_deletes, watermark)
            })
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::ExtractionFailed,
                    "Extraction failed",
                    detail = format!("table {table}"),
                    source: err
                )
            })?;

        if batch.len() as u64 > self.max_rows {
            let cause = etl_error!(
                ErrorKind::ExtractionLimitExceeded,
                "Too many changed rows",
                format!("more than {} rows changed in {table}", self.max_rows)
            );
            return Err(etl_error!(
                ErrorKind::ExtractionFailed,
                "Extraction failed",
                detail = format!("table {table}"),
                source: cause
            ));
        }

        info!(%table, rows = batch.len(), "extracted changed rows");

        Ok(batch)
    }

    async fn extract_once(
        &self,
        table: &TableName,
        track_deletes: bool,
        watermark: DateTime<Utc>,
    ) -> EtlResult<ChangeBatch> {
        let probe = SchemaProber::new(self.source).probe(table).await?;

        // One extra row tells a result at the bound apart from one over it.
        let query = ChangeQuery::builder(table.clone(), probe.columns())
            .since(probe.tracking(), track_deletes, watermark)
            .limit(self.max_rows.saturating_add(1))
            .build();

        if *query.filter() == ChangeFilter::All {
            warn!(%table, "table has no tracking column, extracting every row");
        }

        #[cfg(feature = "failpoints")]
        etl_fail_point(EXTRACT_BEFORE_QUERY)?;

        self.source.fetch_changes(&query).await
    }
}
