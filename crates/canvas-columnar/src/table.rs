#![forbid(unsafe_code)]

use crate::types::{ColumnType, Value};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// Knobs for bulk scans over a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    /// Rows visited per scan chunk (distinct-value enumeration, predicate evaluation, group-by).
    ///
    /// Chunking only changes how a scan is sliced, never its result.
    pub scan_chunk_rows: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            scan_chunk_rows: 65_536,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("column {column} has {actual} values, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    schema: ColumnSchema,
    values: Arc<[Value]>,
}

impl Column {
    /// Build a column, inferring its type from the values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let column_type = ColumnType::infer(&values);
        Self::with_type(name, column_type, values)
    }

    pub fn with_type(name: impl Into<String>, column_type: ColumnType, values: Vec<Value>) -> Self {
        Self {
            schema: ColumnSchema::new(name, column_type),
            values: values.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.schema.column_type
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn take(&self, rows: &[usize]) -> Column {
        let values: Vec<Value> = rows
            .iter()
            .map(|&row| self.values.get(row).cloned().unwrap_or(Value::Null))
            .collect();
        Column {
            schema: self.schema.clone(),
            values: values.into(),
        }
    }
}

/// An immutable columnar table.
///
/// Cloning is cheap: columns are shared. Column lookup by name is a hash lookup and returns
/// `None` for unknown names.
#[derive(Clone, Debug)]
pub struct Table {
    columns: Arc<[Column]>,
    column_index: Arc<HashMap<String, usize>>,
    rows: usize,
    options: TableOptions,
}

impl Table {
    /// A table with no rows and no columns.
    pub fn empty() -> Self {
        Self {
            columns: Arc::from(Vec::new()),
            column_index: Arc::new(HashMap::new()),
            rows: 0,
            options: TableOptions::default(),
        }
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        Self::from_columns_with_options(columns, TableOptions::default())
    }

    pub fn from_columns_with_options(
        columns: Vec<Column>,
        options: TableOptions,
    ) -> Result<Self, TableError> {
        let rows = columns.first().map_or(0, Column::len);
        let mut column_index = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(TableError::ColumnLength {
                    column: column.name().to_owned(),
                    expected: rows,
                    actual: column.len(),
                });
            }
            if column_index.insert(column.name().to_owned(), idx).is_some() {
                return Err(TableError::DuplicateColumn(column.name().to_owned()));
            }
        }

        Ok(Self {
            columns: columns.into(),
            column_index: Arc::new(column_index),
            rows,
            options,
        })
    }

    pub fn options(&self) -> TableOptions {
        self.options
    }

    pub fn with_options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns.iter().map(|c| c.schema.clone()).collect()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(Column::name)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(self.column_index(name)?)
    }

    pub fn column_at(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column type by name; `None` when the column does not exist.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(Column::column_type)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column)?.get(row)
    }

    pub fn get_cell(&self, row: usize, col: usize) -> Value {
        self.columns
            .get(col)
            .and_then(|c| c.get(row))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn row(&self, row: usize) -> Option<Vec<Value>> {
        if row >= self.rows {
            return None;
        }
        Some((0..self.columns.len()).map(|col| self.get_cell(row, col)).collect())
    }

    /// Materialize the given rows (in the given order) into a new table with the same schema.
    pub fn take(&self, rows: &[usize]) -> Table {
        if rows.len() == self.rows && rows.iter().copied().eq(0..self.rows) {
            return self.clone();
        }
        let columns: Vec<Column> = self.columns.iter().map(|c| c.take(rows)).collect();
        Table {
            columns: columns.into(),
            column_index: self.column_index.clone(),
            rows: rows.len(),
            options: self.options,
        }
    }

    /// Row ranges of at most `scan_chunk_rows` rows covering the whole table.
    pub fn chunks(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let step = self.options.scan_chunk_rows.max(1);
        (0..self.rows)
            .step_by(step)
            .map(move |start| start..(start + step).min(self.rows))
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.columns, &other.columns) {
            return self.rows == other.rows;
        }
        self.rows == other.rows && self.columns == other.columns
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::empty()
    }
}
