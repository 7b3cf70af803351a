use std::future::Future;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Persistence of named watermarks between runs.
///
/// Values are opaque strings to the store; [`format_watermark`] and [`parse_watermark`] convert
/// them to and from instants.
pub trait WatermarkStore {
    /// Returns the value stored under `name`, or `None` when nothing was stored yet.
    fn get(&self, name: &str) -> impl Future<Output = EtlResult<Option<String>>> + Send;

    /// Stores `value` under `name`, replacing any previous value.
    fn set(&self, name: &str, value: &str) -> impl Future<Output = EtlResult<()>> + Send;
}

/// Renders `watermark` as RFC 3339 with microsecond precision.
pub fn format_watermark(watermark: DateTime<Utc>) -> String {
    watermark.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Formats accepted for watermarks stored without an offset, read as UTC.
const NAIVE_WATERMARK_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a stored watermark.
///
/// RFC 3339 values may carry any offset. ISO 8601 values without an offset, with a `T` or a space
/// separator, are taken as UTC.
pub fn parse_watermark(value: &str) -> EtlResult<DateTime<Utc>> {
    let err = match DateTime::parse_from_rfc3339(value) {
        Ok(watermark) => return Ok(watermark.with_timezone(&Utc)),
        Err(err) => err,
    };

    for format in NAIVE_WATERMARK_FORMATS {
        if let Ok(watermark) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(watermark.and_utc());
        }
    }

    Err(etl_error!(
        ErrorKind::WatermarkStoreError,
        "Stored watermark is not a valid timestamp",
        format!("value `{value}`"),
        source: err
    ))
}
