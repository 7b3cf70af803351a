use std::fmt::Write;

use chrono::{DateTime, Utc};
use pg_escape::quote_identifier;
use tokio_postgres::types::Type;

use crate::conversions::row::is_supported_type;
use crate::extract::tracking::{TrackingColumn, TrackingColumns};
use crate::types::{ColumnSchema, TableName};

/// Which rows a [`ChangeQuery`] selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilter {
    /// Rows where any of `columns` is at or after `watermark`.
    Since {
        columns: Vec<TrackingColumn>,
        watermark: DateTime<Utc>,
    },
    /// Every row. Used when the table has no tracking column.
    All,
}

/// A bounded query for the rows of one table that changed since a watermark.
///
/// The query is rendered with [`ChangeQuery::to_sql`]; identifiers are quoted and the watermark
/// is the only bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeQuery {
    table: TableName,
    columns: Vec<ColumnSchema>,
    text_casts: Vec<bool>,
    filter: ChangeFilter,
    limit: Option<u64>,
}

impl ChangeQuery {
    /// Returns a builder selecting `columns` from `table`.
    pub fn builder(table: TableName, columns: &[ColumnSchema]) -> ChangeQueryBuilder {
        ChangeQueryBuilder::new(table, columns)
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Columns of the batch the query produces.
    ///
    /// Columns whose type the row decoder does not handle are selected as `text` and reported
    /// with [`Type::TEXT`].
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the value bound to `$1`, if the query filters on a watermark.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match &self.filter {
            ChangeFilter::Since { watermark, .. } => Some(*watermark),
            ChangeFilter::All => None,
        }
    }

    pub fn to_sql(&self) -> String {
        let mut sql = String::from("select ");

        for (index, (column, cast)) in self.columns.iter().zip(&self.text_casts).enumerate() {
            if index > 0 {
                sql.push_str(", ");
            }
            let quoted = quote_identifier(&column.name);
            if *cast {
                let _ = write!(sql, "{quoted}::text as {quoted}");
            } else {
                sql.push_str(&quoted);
            }
        }

        let _ = write!(sql, " from {}", self.table.as_quoted_identifier());

        if let ChangeFilter::Since { columns, .. } = &self.filter {
            let predicates = columns
                .iter()
                .map(|column| {
                    format!(
                        "{} >= $1::timestamptz",
                        quote_identifier(column.column_name())
                    )
                })
                .collect::<Vec<_>>()
                .join(" or ");
            let _ = write!(sql, " where {predicates}");
        }

        if let Some(limit) = self.limit {
            let _ = write!(sql, " limit {limit}");
        }

        sql
    }
}

/// Builder for [`ChangeQuery`].
#[derive(Debug, Clone)]
pub struct ChangeQueryBuilder {
    table: TableName,
    columns: Vec<ColumnSchema>,
    text_casts: Vec<bool>,
    filter: ChangeFilter,
    limit: Option<u64>,
}

impl ChangeQueryBuilder {
    fn new(table: TableName, columns: &[ColumnSchema]) -> Self {
        let mut selected = Vec::with_capacity(columns.len());
        let mut text_casts = Vec::with_capacity(columns.len());

        for column in columns {
            if is_supported_type(&column.typ) {
                selected.push(column.clone());
                text_casts.push(false);
            } else {
                selected.push(ColumnSchema::new(
                    column.name.clone(),
                    Type::TEXT,
                    column.nullable,
                ));
                text_casts.push(true);
            }
        }

        Self {
            table,
            columns: selected,
            text_casts,
            filter: ChangeFilter::All,
            limit: None,
        }
    }

    /// Selects rows changed at or after `watermark` according to `tracking`.
    ///
    /// `deleted_at` takes part only when `track_deletes` is set. Without a usable tracking
    /// column every row is selected.
    pub fn since(
        mut self,
        tracking: &TrackingColumns,
        track_deletes: bool,
        watermark: DateTime<Utc>,
    ) -> Self {
        let columns = tracking.filter_columns(track_deletes);
        self.filter = if columns.is_empty() {
            ChangeFilter::All
        } else {
            ChangeFilter::Since { columns, watermark }
        };
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(self) -> ChangeQuery {
        ChangeQuery {
            table: self.table,
            columns: self.columns,
            text_casts: self.text_casts,
            filter: self.filter,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn products_columns() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("id", Type::INT8, false),
            ColumnSchema::new("sku", Type::TEXT, false),
            ColumnSchema::new("created_at", Type::TIMESTAMPTZ, false),
            ColumnSchema::new("deleted_at", Type::TIMESTAMPTZ, true),
        ]
    }

    #[test]
    fn filter_is_a_disjunction_over_tracking_columns() {
        let columns = products_columns();
        let tracking = TrackingColumns::from_columns(&columns);
        let watermark = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let query = ChangeQuery::builder(TableName::public("products"), &columns)
            .since(&tracking, true, watermark)
            .limit(11)
            .build();

        assert_eq!(
            query.to_sql(),
            r#"select id, sku, created_at, deleted_at from public.products where created_at >= $1::timestamptz or deleted_at >= $1::timestamptz limit 11"#
        );
        assert_eq!(query.watermark(), Some(watermark));
    }

    #[test]
    fn deleted_at_is_ignored_without_soft_delete_tracking() {
        let columns = products_columns();
        let tracking = TrackingColumns::from_columns(&columns);

        let query = ChangeQuery::builder(TableName::public("products"), &columns)
            .since(&tracking, false, Utc::now())
            .build();

        assert_eq!(
            query.filter(),
            &ChangeFilter::Since {
                columns: vec![TrackingColumn::CreatedAt],
                watermark: query.watermark().unwrap(),
            }
        );
        assert!(!query.to_sql().contains("deleted_at >="));
    }

    #[test]
    fn tables_without_tracking_columns_select_every_row() {
        let columns = vec![ColumnSchema::new("id", Type::INT8, false)];
        let tracking = TrackingColumns::from_columns(&columns);

        let query = ChangeQuery::builder(TableName::public("event_categories"), &columns)
            .since(&tracking, false, Utc::now())
            .build();

        assert_eq!(query.filter(), &ChangeFilter::All);
        assert_eq!(query.watermark(), None);
        assert_eq!(query.to_sql(), "select id from public.event_categories");
    }

    #[test]
    fn identifiers_are_quoted_and_unsupported_types_cast_to_text() {
        let columns = vec![
            ColumnSchema::new("Order", Type::INT4, false),
            ColumnSchema::new("ip", Type::INET, true),
        ];

        let query = ChangeQuery::builder(TableName::new("Sales", "orders"), &columns).build();

        assert_eq!(
            query.to_sql(),
            r#"select "Order", ip::text as ip from "Sales".orders"#
        );
        assert_eq!(query.columns()[1].typ, Type::TEXT);
        assert!(query.columns()[1].nullable);
    }
}
