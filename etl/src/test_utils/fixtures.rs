use chrono::{DateTime, Utc};
use tokio_postgres::types::Type;

use crate::types::{Cell, ColumnSchema, TableBatch, TableRow};

/// Parses an RFC 3339 instant.
///
/// # Panics
/// Panics if `value` is not a valid RFC 3339 timestamp.
pub fn instant(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("Invalid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

/// Fluent builder of [`TableBatch`]es for tests.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    columns: Vec<ColumnSchema>,
    rows: Vec<TableRow>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a nullable column.
    pub fn column(mut self, name: &str, typ: Type) -> Self {
        self.columns.push(ColumnSchema::new(name, typ, true));
        self
    }

    pub fn not_null(mut self, name: &str, typ: Type) -> Self {
        self.columns.push(ColumnSchema::new(name, typ, false));
        self
    }

    pub fn row(mut self, values: Vec<Cell>) -> Self {
        self.rows.push(TableRow::new(values));
        self
    }

    /// # Panics
    /// Panics if a row does not have one value per column.
    pub fn build(self) -> TableBatch {
        TableBatch::new(self.columns, self.rows).expect("Row width does not match the columns")
    }
}

/// `products` source table, which has no `updated_at` column.
pub fn products_builder() -> BatchBuilder {
    BatchBuilder::new()
        .not_null("id", Type::INT8)
        .column("category_id", Type::INT8)
        .not_null("name", Type::TEXT)
        .column("description", Type::TEXT)
        .column("image_url", Type::TEXT)
        .not_null("created_at", Type::TIMESTAMPTZ)
        .column("deleted_at", Type::TIMESTAMPTZ)
}

pub fn product_row(id: i64, name: &str, created_at: DateTime<Utc>) -> Vec<Cell> {
    vec![
        Cell::I64(id),
        Cell::I64(1),
        name.into(),
        format!("{name} description").into(),
        Cell::Null,
        Cell::TimestampTz(created_at),
        Cell::Null,
    ]
}

/// `events` source table.
pub fn events_builder() -> BatchBuilder {
    BatchBuilder::new()
        .not_null("id", Type::INT8)
        .column("location_id", Type::INT8)
        .column("category_id", Type::INT8)
        .not_null("name", Type::TEXT)
        .column("description", Type::TEXT)
        .column("date", Type::DATE)
        .not_null("created_at", Type::TIMESTAMPTZ)
        .column("updated_at", Type::TIMESTAMPTZ)
        .column("deleted_at", Type::TIMESTAMPTZ)
}

pub fn event_row(id: i64, name: &str, created_at: DateTime<Utc>) -> Vec<Cell> {
    vec![
        Cell::I64(id),
        Cell::I64(1),
        Cell::I64(1),
        name.into(),
        Cell::Null,
        Cell::Null,
        Cell::TimestampTz(created_at),
        Cell::Null,
        Cell::Null,
    ]
}

/// `users` source table.
pub fn users_builder() -> BatchBuilder {
    BatchBuilder::new()
        .not_null("id", Type::INT8)
        .column("first_name", Type::TEXT)
        .column("last_name", Type::TEXT)
        .not_null("email", Type::TEXT)
        .column("phone", Type::TEXT)
        .column("gender", Type::TEXT)
        .column("date_of_birth", Type::DATE)
        .not_null("created_at", Type::TIMESTAMPTZ)
        .column("updated_at", Type::TIMESTAMPTZ)
}

pub fn user_row(
    id: i64,
    first_name: Option<&str>,
    last_name: Option<&str>,
    updated_at: DateTime<Utc>,
) -> Vec<Cell> {
    vec![
        Cell::I64(id),
        first_name.into(),
        last_name.into(),
        format!("user{id}@example.com").into(),
        Cell::Null,
        Cell::Null,
        Cell::Null,
        Cell::TimestampTz(updated_at),
        Cell::TimestampTz(updated_at),
    ]
}
