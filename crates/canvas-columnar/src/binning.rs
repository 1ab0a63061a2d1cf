#![forbid(unsafe_code)]

use crate::table::Table;
use crate::types::{ColumnType, Value};
use std::collections::HashSet;

/// A string column is considered binnable when its distinct values make up less than this
/// fraction of the row count.
pub const BINNABLE_DISTINCT_FRACTION: f64 = 0.1;

impl Table {
    /// Whether a string column has few enough distinct values to be shown as categories.
    ///
    /// Returns `false` for unknown and non-string columns.
    pub fn is_string_column_binnable(&self, name: &str) -> bool {
        let Some(column) = self.column(name) else {
            return false;
        };
        if column.column_type() != ColumnType::String {
            return false;
        }
        let distinct: HashSet<&Value> = column.values().iter().collect();
        (distinct.len() as f64) < self.row_count() as f64 * BINNABLE_DISTINCT_FRACTION
    }

    /// Names of every binnable string column, in schema order.
    pub fn binnable_string_columns(&self) -> Vec<String> {
        self.column_names()
            .filter(|name| self.is_string_column_binnable(name))
            .map(str::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn table(rows: usize, distinct: usize) -> Table {
        let cat = (0..rows)
            .map(|i| Value::string(format!("c{}", i % distinct)))
            .collect();
        let n = (0..rows).map(|i| Value::from(i as i64)).collect();
        Table::from_columns(vec![Column::new("n", n), Column::new("cat", cat)]).unwrap()
    }

    #[test]
    fn binnable_requires_few_distinct_strings() {
        let t = table(100, 5);
        assert!(t.is_string_column_binnable("cat"));
        assert!(!t.is_string_column_binnable("n"));
        assert!(!t.is_string_column_binnable("missing"));
        assert_eq!(t.binnable_string_columns(), vec!["cat".to_owned()]);

        // 10 distinct values out of 100 rows is not strictly below the threshold.
        assert!(!table(100, 10).is_string_column_binnable("cat"));
    }
}
