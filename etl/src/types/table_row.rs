use crate::types::Cell;

/// A row of a [`crate::types::TableBatch`], with values in the batch's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    /// Returns the value at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.values.get(index)
    }

    pub fn push(&mut self, cell: Cell) {
        self.values.push(cell);
    }

    pub fn into_values(self) -> Vec<Cell> {
        self.values
    }
}

impl From<Vec<Cell>> for TableRow {
    fn from(values: Vec<Cell>) -> Self {
        Self::new(values)
    }
}
