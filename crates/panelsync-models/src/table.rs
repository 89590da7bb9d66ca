use serde_json::{Map, Value};

/// An ordered set of JSON-object rows, as returned by the quote API.
///
/// Rows keep whatever columns the API sent; the column set is the union of
/// keys across rows, in first-seen order, so a ragged payload still exports
/// with a stable header.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    rows: Vec<Map<String, Value>>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Map<String, Value>] {
        &mut self.rows
    }

    /// Union of row keys in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// Header row followed by one row of cells per data row.
    /// Cells missing from a row come out as `Value::Null`.
    pub fn to_grid(&self) -> Vec<Vec<Value>> {
        let columns = self.columns();
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(columns.iter().map(|c| Value::String(c.clone())).collect());
        for row in &self.rows {
            grid.push(
                columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
        }
        grid
    }
}
