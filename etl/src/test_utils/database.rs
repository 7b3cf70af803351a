use config::shared::{PgConnectionConfig, TlsConfig};
use postgres::sqlx::test_utils::{create_pg_database, drop_pg_database};
use sqlx::{Executor, PgPool};
use uuid::Uuid;

/// DDL of the watermark table, matching the syncer migration.
pub const WATERMARKS_TABLE_DDL: &str = r#"
    create schema if not exists etl;
    create table etl.watermarks (
        name text primary key,
        value text not null,
        updated_at timestamptz not null default now()
    );
"#;

/// Builds a connection config for a local Postgres with a random database name.
///
/// Reads `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and the
/// optional `TESTS_DATABASE_PASSWORD`.
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig {
            trusted_root_certs: String::new(),
            enabled: false,
        },
    }
}

/// A throwaway database, dropped again with [`TestDatabase::cleanup`].
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Creates a fresh database holding the watermark table.
    pub async fn spawn() -> Self {
        let config = local_pg_connection_config();
        let pool = create_pg_database(&config).await;
        pool.execute(WATERMARKS_TABLE_DDL)
            .await
            .expect("Failed to create the watermarks table");

        Self { config, pool }
    }

    /// Runs `sql`, which may hold several statements.
    pub async fn run(&self, sql: &str) {
        self.pool
            .execute(sql)
            .await
            .expect("Failed to run test statement");
    }

    pub async fn cleanup(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}
