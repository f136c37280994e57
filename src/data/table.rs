use std::collections::HashMap;

use super::model::MetadataValue;

// ---------------------------------------------------------------------------
// AggregateTable – column-oriented output table
// ---------------------------------------------------------------------------

/// Ordered columns of equal length. Cells never written are `Null`.
#[derive(Debug, Clone, Default)]
pub struct AggregateTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<Vec<MetadataValue>>,
    rows: usize,
}

impl AggregateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table with the given leading columns.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for c in columns {
            table.declare(c.as_ref());
        }
        table
    }

    /// Position of `name`, appending the column (filled with `Null`) if new.
    pub fn declare(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.columns.len();
        self.columns.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.values.push(vec![MetadataValue::Null; self.rows]);
        idx
    }

    /// Append a row. Unknown columns are appended; columns the row does not
    /// mention get `Null`.
    pub fn push_row<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (String, MetadataValue)>,
    {
        for col in &mut self.values {
            col.push(MetadataValue::Null);
        }
        self.rows += 1;
        for (name, value) in cells {
            let idx = self.declare(&name);
            self.values[idx][self.rows - 1] = value;
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn column(&self, name: &str) -> Option<&[MetadataValue]> {
        self.index.get(name).map(|&i| self.values[i].as_slice())
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&MetadataValue> {
        self.column(name).and_then(|c| c.get(row))
    }

    /// Cells of row `row`, in column order.
    pub fn row(&self, row: usize) -> impl Iterator<Item = &MetadataValue> {
        self.values.iter().map(move |col| &col[row])
    }
}
