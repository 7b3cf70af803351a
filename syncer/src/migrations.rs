use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::Executor;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

use crate::error::SyncerResult;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// Runs the migrations creating the `etl.watermarks` table in the source database.
pub async fn migrate_watermarks(config: &PgConnectionConfig) -> SyncerResult<()> {
    let options: PgConnectOptions = config.with_db();

    let pool = PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .min_connections(NUM_POOL_CONNECTIONS)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists etl;").await?;
                // Keeps the `_sqlx_migrations` bookkeeping table out of the public schema.
                conn.execute("set search_path = 'etl';").await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    pool.close().await;

    info!("watermark table migrations applied");

    Ok(())
}
