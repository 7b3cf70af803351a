use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSqlOwned, Type};
use uuid::Uuid;

use crate::conversions::numeric::PgNumeric;
use crate::error::EtlResult;
use crate::types::{Cell, ColumnSchema, TableRow};

/// Returns `true` for the column types [`row_to_table_row`] decodes natively.
///
/// Columns of other types are cast to `text` by the change query.
pub fn is_supported_type(typ: &Type) -> bool {
    matches!(
        *typ,
        Type::BOOL
            | Type::BPCHAR
            | Type::VARCHAR
            | Type::NAME
            | Type::TEXT
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::UUID
            | Type::JSON
            | Type::JSONB
            | Type::BYTEA
            | Type::BOOL_ARRAY
            | Type::TEXT_ARRAY
            | Type::VARCHAR_ARRAY
            | Type::INT2_ARRAY
            | Type::INT4_ARRAY
            | Type::INT8_ARRAY
            | Type::FLOAT4_ARRAY
            | Type::FLOAT8_ARRAY
            | Type::UUID_ARRAY
    )
}

/// Converts a row returned by the change query into a [`TableRow`].
pub fn row_to_table_row(row: &Row, columns: &[ColumnSchema]) -> EtlResult<TableRow> {
    let mut values = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        values.push(cell_from_row(row, index, &column.typ)?);
    }

    Ok(TableRow::new(values))
}

fn cell_from_row(row: &Row, index: usize, typ: &Type) -> EtlResult<Cell> {
    let cell = match *typ {
        Type::BOOL => optional(row, index, Cell::Bool)?,
        Type::INT2 => optional(row, index, Cell::I16)?,
        Type::INT4 => optional(row, index, Cell::I32)?,
        Type::INT8 => optional(row, index, Cell::I64)?,
        Type::FLOAT4 => optional(row, index, Cell::F32)?,
        Type::FLOAT8 => optional(row, index, Cell::F64)?,
        Type::NUMERIC => optional::<PgNumeric>(row, index, Cell::Numeric)?,
        Type::DATE => optional::<NaiveDate>(row, index, Cell::Date)?,
        Type::TIME => optional::<NaiveTime>(row, index, Cell::Time)?,
        Type::TIMESTAMP => optional::<NaiveDateTime>(row, index, Cell::Timestamp)?,
        Type::TIMESTAMPTZ => optional::<DateTime<Utc>>(row, index, Cell::TimestampTz)?,
        Type::UUID => optional::<Uuid>(row, index, Cell::Uuid)?,
        Type::JSON | Type::JSONB => optional::<Value>(row, index, Cell::Json)?,
        Type::BYTEA => optional::<Vec<u8>>(row, index, Cell::Bytes)?,
        Type::BOOL_ARRAY => array::<bool>(row, index)?,
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => array::<String>(row, index)?,
        Type::INT2_ARRAY => array::<i16>(row, index)?,
        Type::INT4_ARRAY => array::<i32>(row, index)?,
        Type::INT8_ARRAY => array::<i64>(row, index)?,
        Type::FLOAT4_ARRAY => array::<f32>(row, index)?,
        Type::FLOAT8_ARRAY => array::<f64>(row, index)?,
        Type::UUID_ARRAY => array::<Uuid>(row, index)?,
        _ => optional::<String>(row, index, Cell::String)?,
    };

    Ok(cell)
}

fn optional<T>(row: &Row, index: usize, into_cell: impl FnOnce(T) -> Cell) -> EtlResult<Cell>
where
    T: FromSqlOwned,
{
    let value: Option<T> = row.try_get(index)?;

    Ok(value.map(into_cell).unwrap_or(Cell::Null))
}

fn array<T>(row: &Row, index: usize) -> EtlResult<Cell>
where
    T: FromSqlOwned + Serialize,
{
    let value: Option<Vec<Option<T>>> = row.try_get(index)?;

    match value {
        Some(elements) => Ok(Cell::Json(serde_json::to_value(elements)?)),
        None => Ok(Cell::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_column_types_are_decoded_natively() {
        for typ in [
            Type::INT8,
            Type::TEXT,
            Type::TIMESTAMPTZ,
            Type::TIMESTAMP,
            Type::NUMERIC,
            Type::JSONB,
            Type::INT4_ARRAY,
        ] {
            assert!(is_supported_type(&typ), "{typ} should be supported");
        }
    }

    #[test]
    fn exotic_types_fall_back_to_text() {
        assert!(!is_supported_type(&Type::INET));
        assert!(!is_supported_type(&Type::INTERVAL));
        assert!(!is_supported_type(&Type::MONEY));
        assert!(!is_supported_type(&Type::CHAR));
    }
}
