use prost::bytes;

use crate::types::{Cell, TableRow};

/// Protobuf view of a [`TableRow`] for the Storage Write API.
///
/// Field numbers follow the column order starting at 1, null cells are omitted.
#[derive(Debug, Clone)]
pub struct BigQueryTableRow(pub TableRow);

impl prost::Message for BigQueryTableRow {
    fn encode_raw(&self, buf: &mut impl bytes::BufMut)
    where
        Self: Sized,
    {
        for (tag, cell) in (1..).zip(self.0.values()) {
            cell_encode_prost(cell, tag, buf);
        }
    }

    fn merge_field(
        &mut self,
        _tag: u32,
        _wire_type: prost::encoding::WireType,
        _buf: &mut impl bytes::Buf,
        _ctx: prost::encoding::DecodeContext,
    ) -> Result<(), prost::DecodeError>
    where
        Self: Sized,
    {
        Err(prost::DecodeError::new(
            "decoding warehouse rows is not supported",
        ))
    }

    fn encoded_len(&self) -> usize {
        (1..)
            .zip(self.0.values())
            .map(|(tag, cell)| cell_encode_len_prost(cell, tag))
            .sum()
    }

    fn clear(&mut self) {
        self.0 = TableRow::new(Vec::new());
    }
}

/// Text rendering of cells BigQuery ingests as strings.
fn cell_as_text(cell: &Cell) -> Option<String> {
    let text = match cell {
        Cell::Numeric(n) => n.to_string(),
        Cell::Date(t) => t.format("%Y-%m-%d").to_string(),
        Cell::Time(t) => t.format("%H:%M:%S%.f").to_string(),
        Cell::Timestamp(t) => t.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        Cell::TimestampTz(t) => t.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
        Cell::Uuid(u) => u.to_string(),
        Cell::Json(j) => j.to_string(),
        _ => return None,
    };

    Some(text)
}

pub fn cell_encode_prost(cell: &Cell, tag: u32, buf: &mut impl bytes::BufMut) {
    match cell {
        Cell::Null => {}
        Cell::Bool(b) => prost::encoding::bool::encode(tag, b, buf),
        Cell::String(s) => prost::encoding::string::encode(tag, s, buf),
        Cell::I16(i) => prost::encoding::int32::encode(tag, &i32::from(*i), buf),
        Cell::I32(i) => prost::encoding::int32::encode(tag, i, buf),
        Cell::I64(i) => prost::encoding::int64::encode(tag, i, buf),
        Cell::F32(f) => prost::encoding::float::encode(tag, f, buf),
        Cell::F64(f) => prost::encoding::double::encode(tag, f, buf),
        Cell::Bytes(b) => prost::encoding::bytes::encode(tag, b, buf),
        other => {
            if let Some(text) = cell_as_text(other) {
                prost::encoding::string::encode(tag, &text, buf);
            }
        }
    }
}

pub fn cell_encode_len_prost(cell: &Cell, tag: u32) -> usize {
    match cell {
        Cell::Null => 0,
        Cell::Bool(b) => prost::encoding::bool::encoded_len(tag, b),
        Cell::String(s) => prost::encoding::string::encoded_len(tag, s),
        Cell::I16(i) => prost::encoding::int32::encoded_len(tag, &i32::from(*i)),
        Cell::I32(i) => prost::encoding::int32::encoded_len(tag, i),
        Cell::I64(i) => prost::encoding::int64::encoded_len(tag, i),
        Cell::F32(f) => prost::encoding::float::encoded_len(tag, f),
        Cell::F64(f) => prost::encoding::double::encoded_len(tag, f),
        Cell::Bytes(b) => prost::encoding::bytes::encoded_len(tag, b),
        other => cell_as_text(other)
            .map(|text| prost::encoding::string::encoded_len(tag, &text))
            .unwrap_or(0),
    }
}
