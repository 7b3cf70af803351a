//! Column-level building blocks shared by the table transforms.

use std::collections::{HashMap, HashSet};

use tokio_postgres::types::Type;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, ColumnSchema, TableBatch, TableRow};

/// Change-tracking columns every projected destination table carries.
pub const TIMESTAMP_COLUMNS: [&str; 3] = ["created_at", "updated_at", "deleted_at"];

/// Suffixes added to colliding column names when joining.
pub const DEFAULT_SUFFIXES: (&str, &str) = ("_x", "_y");

/// One column of a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectedColumn {
    /// Copies a column that must exist in the input.
    Column(String),
    /// Copies a column when present; otherwise emits a nullable column of `typ` holding nulls.
    Optional { name: String, typ: Type },
    /// Copies a column under a new name.
    Renamed { from: String, to: String },
    /// Joins text columns with `separator`. The result is null when any part is null.
    Concat {
        name: String,
        parts: Vec<String>,
        separator: String,
    },
}

impl ProjectedColumn {
    pub fn column(name: impl Into<String>) -> Self {
        ProjectedColumn::Column(name.into())
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        ProjectedColumn::Renamed {
            from: from.into(),
            to: to.into(),
        }
    }

    /// The tracking timestamps, which source tables do not all have.
    pub fn timestamps() -> Vec<ProjectedColumn> {
        TIMESTAMP_COLUMNS
            .iter()
            .map(|name| ProjectedColumn::Optional {
                name: name.to_string(),
                typ: Type::TIMESTAMPTZ,
            })
            .collect()
    }
}

enum ValueSource {
    Index(usize),
    Null,
    Concat {
        indices: Vec<usize>,
        separator: String,
    },
}

/// Selects, renames and derives columns of `batch`.
///
/// Fails with [`ErrorKind::MissingColumn`] when a required column is absent.
pub fn project(batch: &TableBatch, columns: &[ProjectedColumn]) -> EtlResult<TableBatch> {
    let mut schema = Vec::with_capacity(columns.len());
    let mut sources = Vec::with_capacity(columns.len());

    for column in columns {
        match column {
            ProjectedColumn::Column(name) => {
                let index = batch.require_column(name)?;
                schema.push(batch.columns()[index].clone());
                sources.push(ValueSource::Index(index));
            }
            ProjectedColumn::Optional { name, typ } => match batch.column_index(name) {
                Some(index) => {
                    schema.push(batch.columns()[index].clone());
                    sources.push(ValueSource::Index(index));
                }
                None => {
                    schema.push(ColumnSchema::new(name.clone(), typ.clone(), true));
                    sources.push(ValueSource::Null);
                }
            },
            ProjectedColumn::Renamed { from, to } => {
                let index = batch.require_column(from)?;
                schema.push(batch.columns()[index].renamed(to.clone()));
                sources.push(ValueSource::Index(index));
            }
            ProjectedColumn::Concat {
                name,
                parts,
                separator,
            } => {
                let mut indices = Vec::with_capacity(parts.len());
                let mut nullable = false;
                for part in parts {
                    let index = batch.require_column(part)?;
                    nullable |= batch.columns()[index].nullable;
                    indices.push(index);
                }
                schema.push(ColumnSchema::new(name.clone(), Type::TEXT, nullable));
                sources.push(ValueSource::Concat {
                    indices,
                    separator: separator.clone(),
                });
            }
        }
    }

    let mut rows = Vec::with_capacity(batch.len());
    for row in batch.rows() {
        let mut values = Vec::with_capacity(sources.len());
        for source in &sources {
            let value = match source {
                ValueSource::Index(index) => row.get(*index).cloned().unwrap_or(Cell::Null),
                ValueSource::Null => Cell::Null,
                ValueSource::Concat { indices, separator } => concat(row, indices, separator)?,
            };
            values.push(value);
        }
        rows.push(TableRow::new(values));
    }

    TableBatch::new(schema, rows)
}

fn concat(row: &TableRow, indices: &[usize], separator: &str) -> EtlResult<Cell> {
    let mut parts = Vec::with_capacity(indices.len());
    for index in indices {
        match row.get(*index) {
            None | Some(Cell::Null) => return Ok(Cell::Null),
            Some(Cell::String(value)) => parts.push(value.as_str()),
            Some(other) => bail!(
                ErrorKind::InvalidData,
                "Only text values can be concatenated",
                format!("got {other:?}")
            ),
        }
    }

    Ok(Cell::String(parts.join(separator)))
}

/// Join key built from a cell, so that equal values of different integer widths match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Int(i64),
    Float(u64),
    Bool(bool),
    Text(String),
}

impl CellKey {
    /// Returns `None` for nulls, which never match.
    fn from_cell(cell: &Cell) -> Option<CellKey> {
        let key = match cell {
            Cell::Null => return None,
            Cell::Bool(value) => CellKey::Bool(*value),
            Cell::I16(_) | Cell::I32(_) | Cell::I64(_) => CellKey::Int(cell.as_i64()?),
            Cell::F32(value) => CellKey::Float(f64::from(*value).to_bits()),
            Cell::F64(value) => CellKey::Float(value.to_bits()),
            Cell::String(value) => CellKey::Text(value.clone()),
            Cell::Numeric(value) => CellKey::Text(value.to_string()),
            Cell::Date(value) => CellKey::Text(value.to_string()),
            Cell::Time(value) => CellKey::Text(value.to_string()),
            Cell::Timestamp(value) => CellKey::Text(value.to_string()),
            Cell::TimestampTz(value) => CellKey::Text(value.to_rfc3339()),
            Cell::Uuid(value) => CellKey::Text(value.to_string()),
            Cell::Json(value) => CellKey::Text(value.to_string()),
            Cell::Bytes(value) => CellKey::Text(format!("{value:?}")),
        };

        Some(key)
    }
}

/// Inner join of two batches on `left_on = right_on`.
///
/// Output rows follow the left batch order, and for each left row the matching right rows in
/// their order. Columns are the left columns followed by the right ones. A name present on
/// both sides gets `suffixes.0` on the left and `suffixes.1` on the right; when both keys share a
/// name it appears once, unsuffixed.
pub fn inner_join(
    left: &TableBatch,
    right: &TableBatch,
    left_on: &str,
    right_on: &str,
    suffixes: (&str, &str),
) -> EtlResult<TableBatch> {
    let left_key = left.require_column(left_on)?;
    let right_key = right.require_column(right_on)?;
    let shared_key = left_on == right_on;

    let right_indices: Vec<usize> = (0..right.columns().len())
        .filter(|index| !shared_key || *index != right_key)
        .collect();

    let left_names: HashSet<&str> = left.column_names().collect();
    let right_names: HashSet<&str> = right_indices
        .iter()
        .map(|index| right.columns()[*index].name.as_str())
        .collect();

    let mut columns = Vec::with_capacity(left.columns().len() + right_indices.len());
    for column in left.columns() {
        if right_names.contains(column.name.as_str()) {
            columns.push(column.renamed(format!("{}{}", column.name, suffixes.0)));
        } else {
            columns.push(column.clone());
        }
    }
    for index in &right_indices {
        let column = &right.columns()[*index];
        if left_names.contains(column.name.as_str()) {
            columns.push(column.renamed(format!("{}{}", column.name, suffixes.1)));
        } else {
            columns.push(column.clone());
        }
    }

    let mut matches: HashMap<CellKey, Vec<usize>> = HashMap::new();
    for (position, row) in right.rows().iter().enumerate() {
        if let Some(key) = row.get(right_key).and_then(CellKey::from_cell) {
            matches.entry(key).or_default().push(position);
        }
    }

    let mut rows = Vec::new();
    for left_row in left.rows() {
        let Some(key) = left_row.get(left_key).and_then(CellKey::from_cell) else {
            continue;
        };
        let Some(positions) = matches.get(&key) else {
            continue;
        };

        for position in positions {
            let right_row = &right.rows()[*position];
            let mut values = left_row.values().to_vec();
            values.extend(
                right_indices
                    .iter()
                    .map(|index| right_row.get(*index).cloned().unwrap_or(Cell::Null)),
            );
            rows.push(TableRow::new(values));
        }
    }

    TableBatch::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableBatch {
        TableBatch::new(
            vec![
                ColumnSchema::new("id", Type::INT8, false),
                ColumnSchema::new("first_name", Type::TEXT, true),
                ColumnSchema::new("last_name", Type::TEXT, true),
            ],
            vec![
                TableRow::new(vec![Cell::I64(1), "Ada".into(), "Lovelace".into()]),
                TableRow::new(vec![Cell::I64(2), "Alan".into(), Cell::Null]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn projection_derives_and_fills_columns() {
        let mut columns = vec![
            ProjectedColumn::column("id"),
            ProjectedColumn::Concat {
                name: "fullname".to_string(),
                parts: vec!["first_name".to_string(), "last_name".to_string()],
                separator: " ".to_string(),
            },
        ];
        columns.extend(ProjectedColumn::timestamps());

        let projected = project(&users(), &columns).unwrap();

        assert_eq!(
            projected.column_names().collect::<Vec<_>>(),
            vec!["id", "fullname", "created_at", "updated_at", "deleted_at"]
        );
        assert_eq!(
            projected.rows()[0].values()[1],
            Cell::String("Ada Lovelace".to_string())
        );
        assert_eq!(projected.rows()[1].values()[1], Cell::Null);
        assert!(projected.columns()[2].nullable);
        assert_eq!(projected.columns()[2].typ, Type::TIMESTAMPTZ);
        assert!(projected.column_values(4).all(Cell::is_null));
    }

    #[test]
    fn projection_of_a_missing_column_fails() {
        let err = project(&users(), &[ProjectedColumn::column("email")]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingColumn);
    }

    #[test]
    fn join_suffixes_colliding_columns_and_keeps_left_order() {
        let orders = TableBatch::new(
            vec![
                ColumnSchema::new("id", Type::INT8, false),
                ColumnSchema::new("user_id", Type::INT4, false),
            ],
            vec![
                TableRow::new(vec![Cell::I64(10), Cell::I32(2)]),
                TableRow::new(vec![Cell::I64(11), Cell::I32(1)]),
                TableRow::new(vec![Cell::I64(12), Cell::I32(3)]),
                TableRow::new(vec![Cell::I64(13), Cell::Null]),
            ],
        )
        .unwrap();

        let joined = inner_join(&orders, &users(), "user_id", "id", DEFAULT_SUFFIXES).unwrap();

        assert_eq!(
            joined.column_names().collect::<Vec<_>>(),
            vec!["id_x", "user_id", "id_y", "first_name", "last_name"]
        );
        assert_eq!(
            joined.column_values(0).map(Cell::as_i64).collect::<Vec<_>>(),
            vec![Some(10), Some(11)]
        );
        assert_eq!(joined.rows()[0].values()[3], Cell::String("Alan".to_string()));
    }

    #[test]
    fn join_on_a_shared_key_keeps_one_key_column() {
        let emails = TableBatch::new(
            vec![
                ColumnSchema::new("id", Type::INT8, false),
                ColumnSchema::new("email", Type::TEXT, false),
            ],
            vec![
                TableRow::new(vec![Cell::I64(1), "ada@example.com".into()]),
                TableRow::new(vec![Cell::I64(1), "ada@work.example.com".into()]),
            ],
        )
        .unwrap();

        let joined = inner_join(&users(), &emails, "id", "id", DEFAULT_SUFFIXES).unwrap();

        assert_eq!(
            joined.column_names().collect::<Vec<_>>(),
            vec!["id", "first_name", "last_name", "email"]
        );
        assert_eq!(joined.len(), 2);
    }
}
