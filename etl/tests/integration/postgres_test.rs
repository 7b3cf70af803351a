use etl::error::ErrorKind;
use etl::extract::Extractor;
use etl::retry::RetryPolicy;
use etl::source::Source;
use etl::source::postgres::PgSource;
use etl::test_utils::database::TestDatabase;
use etl::test_utils::fixtures::instant;
use etl::types::{Cell, ChangeBatch, TableName};
use etl::watermark::WatermarkStore;
use etl::watermark::postgres::PostgresWatermarkStore;
use telemetry::tracing::init_test_tracing;

const PRODUCTS_DDL: &str = r#"
    create table public.products (
        id bigint primary key,
        name text not null,
        created_at timestamptz not null,
        updated_at timestamptz,
        deleted_at timestamptz
    );
    insert into public.products values
        (1, 'old', '2024-01-01T00:00:00Z', null, null),
        (2, 'updated', '2024-01-01T00:00:00Z', '2024-03-12T00:00:00Z', null),
        (3, 'new', '2024-03-11T00:00:00Z', null, null),
        (4, 'deleted', '2024-01-01T00:00:00Z', null, '2024-03-12T00:00:00Z');
"#;

#[ignore = "requires a running Postgres"]
#[tokio::test(flavor = "multi_thread")]
async fn source_reports_columns_in_ordinal_order() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    database.run(PRODUCTS_DDL).await;

    let source = PgSource::new(database.config.clone());
    let columns = source
        .table_columns(&TableName::public("products"))
        .await
        .unwrap();

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["id", "name", "created_at", "updated_at", "deleted_at"]
    );
    assert!(!columns[0].nullable);
    assert!(columns[3].nullable);

    let err = source
        .table_columns(&TableName::public("missing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceSchemaError);

    database.cleanup().await;
}

#[ignore = "requires a running Postgres"]
#[tokio::test(flavor = "multi_thread")]
async fn extraction_filters_on_every_tracking_column() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    database.run(PRODUCTS_DDL).await;

    let source = PgSource::new(database.config.clone());
    let extractor = Extractor::new(&source, RetryPolicy::none(), 100);
    let table = TableName::public("products");
    let watermark = instant("2024-03-10T00:00:00Z");

    let ids = |batch: &ChangeBatch| -> Vec<i64> {
        let mut ids: Vec<i64> = batch.column_values(0).filter_map(Cell::as_i64).collect();
        ids.sort_unstable();
        ids
    };

    let changes = extractor.extract(&table, false, watermark).await.unwrap();
    assert_eq!(ids(&changes), vec![2, 3]);

    let changes = extractor.extract(&table, true, watermark).await.unwrap();
    assert_eq!(ids(&changes), vec![2, 3, 4]);

    database.cleanup().await;
}

#[ignore = "requires a running Postgres"]
#[tokio::test(flavor = "multi_thread")]
async fn watermark_store_upserts_values() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    let store = PostgresWatermarkStore::from_pool(database.pool.clone());

    assert_eq!(store.get("last_extracted_at").await.unwrap(), None);

    store
        .set("last_extracted_at", "2024-03-10T00:00:00.000000Z")
        .await
        .unwrap();
    store
        .set("last_extracted_at", "2024-03-11T00:00:00.000000Z")
        .await
        .unwrap();

    assert_eq!(
        store.get("last_extracted_at").await.unwrap().as_deref(),
        Some("2024-03-11T00:00:00.000000Z")
    );

    database.cleanup().await;
}
