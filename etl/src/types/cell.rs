use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::conversions::numeric::PgNumeric;

/// A single typed value of a row.
///
/// Postgres arrays are carried as [`Cell::Json`] arrays since every warehouse column they end up
/// in is loaded as JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    String(String),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Numeric(PgNumeric),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns the string content of a [`Cell::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the integer value of any integer cell widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::I16(value) => Some(i64::from(*value)),
            Cell::I32(value) => Some(i64::from(*value)),
            Cell::I64(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the instant a temporal cell represents, reading naive values as UTC.
    ///
    /// Dates are read as midnight. Used to compare tracking columns with the watermark.
    pub fn as_utc_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Cell::TimestampTz(value) => Some(*value),
            Cell::Timestamp(value) => Some(value.and_utc()),
            Cell::Date(value) => value.and_hms_opt(0, 0, 0).map(|value| value.and_utc()),
            _ => None,
        }
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::I32(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(value: DateTime<Utc>) -> Self {
        Cell::TimestampTz(value)
    }
}

impl<T> From<Option<T>> for Cell
where
    T: Into<Cell>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn integer_cells_widen_to_i64() {
        assert_eq!(Cell::I16(7).as_i64(), Some(7));
        assert_eq!(Cell::I32(-3).as_i64(), Some(-3));
        assert_eq!(Cell::String("7".into()).as_i64(), None);
    }

    #[test]
    fn temporal_cells_map_to_utc_instants() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        assert_eq!(Cell::TimestampTz(instant).as_utc_instant(), Some(instant));
        assert_eq!(
            Cell::Timestamp(instant.naive_utc()).as_utc_instant(),
            Some(instant)
        );
        assert_eq!(
            Cell::Date(instant.date_naive()).as_utc_instant(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(Cell::Null.as_utc_instant(), None);
    }

    #[test]
    fn optional_values_become_null() {
        assert_eq!(Cell::from(None::<i64>), Cell::Null);
        assert_eq!(Cell::from(Some("a")), Cell::String("a".to_string()));
    }
}
