use sqlx::{PgExecutor, prelude::FromRow};

/// A row from the `etl.watermarks` table.
#[derive(Debug, FromRow)]
pub struct WatermarkRow {
    pub name: String,
    pub value: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Fetches the watermark stored under `name`, if any.
pub async fn get_watermark<'c, E>(executor: E, name: &str) -> sqlx::Result<Option<WatermarkRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, WatermarkRow>(
        r#"
        select name, value, updated_at
        from etl.watermarks
        where name = $1
        "#,
    )
    .bind(name)
    .fetch_optional(executor)
    .await
}

/// Inserts or overwrites the watermark stored under `name`.
pub async fn upsert_watermark<'c, E>(executor: E, name: &str, value: &str) -> sqlx::Result<()>
where
    E: PgExecutor<'c>,
{
    sqlx::query(
        r#"
        insert into etl.watermarks (name, value, updated_at)
        values ($1, $2, now())
        on conflict (name) do update
        set value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(name)
    .bind(value)
    .execute(executor)
    .await?;

    Ok(())
}
