use std::fmt;

use crate::types::ColumnSchema;

/// A column whose value tells when a row last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackingColumn {
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

impl TrackingColumn {
    /// Candidates in the order they appear in the change query.
    pub const ALL: [TrackingColumn; 3] = [
        TrackingColumn::CreatedAt,
        TrackingColumn::UpdatedAt,
        TrackingColumn::DeletedAt,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            TrackingColumn::CreatedAt => "created_at",
            TrackingColumn::UpdatedAt => "updated_at",
            TrackingColumn::DeletedAt => "deleted_at",
        }
    }

    /// Returns the candidate called `name`, if any.
    pub fn from_column_name(name: &str) -> Option<TrackingColumn> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.column_name() == name)
    }
}

impl fmt::Display for TrackingColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// The tracking columns found on a source table, in [`TrackingColumn::ALL`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingColumns(Vec<TrackingColumn>);

impl TrackingColumns {
    /// Picks the tracking columns present in `columns`.
    pub fn from_columns(columns: &[ColumnSchema]) -> Self {
        let found = TrackingColumn::ALL
            .into_iter()
            .filter(|candidate| {
                columns
                    .iter()
                    .any(|column| column.name == candidate.column_name())
            })
            .collect();

        Self(found)
    }

    pub fn contains(&self, column: TrackingColumn) -> bool {
        self.0.contains(&column)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TrackingColumn> + '_ {
        self.0.iter().copied()
    }

    /// Returns the columns usable in the change filter.
    ///
    /// `deleted_at` only counts when soft deletes are tracked for the table.
    pub fn filter_columns(&self, track_deletes: bool) -> Vec<TrackingColumn> {
        self.iter()
            .filter(|column| track_deletes || *column != TrackingColumn::DeletedAt)
            .collect()
    }
}

impl FromIterator<TrackingColumn> for TrackingColumns {
    fn from_iter<I: IntoIterator<Item = TrackingColumn>>(iter: I) -> Self {
        let mut columns: Vec<_> = iter.into_iter().collect();
        columns.sort();
        columns.dedup();

        Self(columns)
    }
}
