use std::io::BufReader;

use config::shared::{IntoConnectOptions, PgConnectionConfig};
use postgres::types::convert_type_oid_to_type;
use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, Connection, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info};

use crate::bail;
use crate::conversions::row::row_to_table_row;
use crate::error::{ErrorKind, EtlResult};
use crate::extract::query::ChangeQuery;
use crate::source::base::Source;
use crate::types::{ChangeBatch, ColumnSchema, TableBatch, TableName};

/// Catalog query returning the live columns of a table in ordinal order.
const TABLE_COLUMNS_QUERY: &str = r#"
    select a.attname, a.atttypid, not a.attnotnull as nullable
    from pg_catalog.pg_attribute a
    join pg_catalog.pg_class c on c.oid = a.attrelid
    join pg_catalog.pg_namespace n on n.oid = c.relnamespace
    where n.nspname = $1
      and c.relname = $2
      and a.attnum > 0
      and not a.attisdropped
    order by a.attnum
"#;

/// Spawns a background task to drive a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        let result = connection.await;

        match result {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => debug!("postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    // The connection ends when the `Client` that owns it is dropped.
    tokio::spawn(task);
}

/// [`Source`] reading from a Postgres database over `tokio-postgres`.
///
/// Every operation opens its own connection and drops it when done. A retried extraction
/// therefore always starts from a fresh connection, and no idle connection is kept between
/// scheduled runs.
#[derive(Debug, Clone)]
pub struct PgSource {
    config: PgConnectionConfig,
}

impl PgSource {
    pub fn new(config: PgConnectionConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> EtlResult<Client> {
        match self.config.tls.enabled {
            true => self.connect_tls().await,
            false => self.connect_no_tls().await,
        }
    }

    async fn connect_no_tls(&self) -> EtlResult<Client> {
        let config: Config = self.config.with_db();

        let (client, connection) = config.connect(NoTls).await?;
        spawn_postgres_connection::<NoTls>(connection);

        debug!("connected to postgres without tls");

        Ok(client)
    }

    async fn connect_tls(&self) -> EtlResult<Client> {
        let config: Config = self.config.with_db();

        let mut root_store = rustls::RootCertStore::empty();
        let mut root_certs_reader = BufReader::new(self.config.tls.trusted_root_certs.as_bytes());
        for cert in rustls_pemfile::certs(&mut root_certs_reader) {
            let cert = cert?;
            root_store.add(cert)?;
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let (client, connection) = config.connect(MakeRustlsConnect::new(tls_config)).await?;
        spawn_postgres_connection::<MakeRustlsConnect>(connection);

        debug!("connected to postgres with tls");

        Ok(client)
    }
}

impl Source for PgSource {
    fn name() -> &'static str {
        "postgres"
    }

    async fn table_columns(&self, table: &TableName) -> EtlResult<Vec<ColumnSchema>> {
        let client = self.connect().await?;

        let rows = client
            .query(TABLE_COLUMNS_QUERY, &[&table.schema, &table.name])
            .await?;

        if rows.is_empty() {
            bail!(
                ErrorKind::SourceSchemaError,
                "Table not found in the source catalog",
                format!("table {table} does not exist or has no columns")
            );
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("attname")?;
            let type_oid: u32 = row.try_get("atttypid")?;
            let nullable: bool = row.try_get("nullable")?;

            columns.push(ColumnSchema::new(
                name,
                convert_type_oid_to_type(type_oid),
                nullable,
            ));
        }

        Ok(columns)
    }

    async fn fetch_changes(&self, query: &ChangeQuery) -> EtlResult<ChangeBatch> {
        let client = self.connect().await?;

        let sql = query.to_sql();
        debug!(table = %query.table(), %sql, "running change query");

        let rows = match query.watermark() {
            Some(watermark) => client.query(sql.as_str(), &[&watermark]).await?,
            None => client.query(sql.as_str(), &[]).await?,
        };

        let columns = query.columns().to_vec();
        let mut table_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            table_rows.push(row_to_table_row(row, &columns)?);
        }

        info!(table = %query.table(), rows = table_rows.len(), "fetched changed rows");

        TableBatch::new(columns, table_rows)
    }
}
