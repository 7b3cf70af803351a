use std::time::Duration;

use config::shared::{IntoConnectOptions, PgConnectionConfig};
use postgres::sqlx::watermark;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::error::EtlResult;
use crate::watermark::base::WatermarkStore;

/// The store only issues one query per run.
const MAX_POOL_CONNECTIONS: u32 = 1;

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// [`WatermarkStore`] backed by the `etl.watermarks` table of the source database.
///
/// The table is created by the syncer migrations.
#[derive(Debug, Clone)]
pub struct PostgresWatermarkStore {
    pool: PgPool,
}

impl PostgresWatermarkStore {
    /// Creates a store with a lazily connected pool; no connection is opened until first use.
    pub fn new(config: &PgConnectionConfig) -> Self {
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(MAX_POOL_CONNECTIONS)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .connect_lazy_with(config.with_db());

        Self { pool }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl WatermarkStore for PostgresWatermarkStore {
    async fn get(&self, name: &str) -> EtlResult<Option<String>> {
        let row = watermark::get_watermark(&self.pool, name).await?;

        if let Some(row) = &row {
            debug!(name, value = %row.value, updated_at = %row.updated_at, "read stored watermark");
        }

        Ok(row.map(|row| row.value))
    }

    async fn set(&self, name: &str, value: &str) -> EtlResult<()> {
        watermark::upsert_watermark(&self.pool, name, value).await?;

        debug!(name, value, "stored watermark");

        Ok(())
    }
}
