#![forbid(unsafe_code)]

//! Distinct-value scans and relational group-by over a [`Table`].
//!
//! Both scans walk the table in `scan_chunk_rows` chunks and report groups in first-seen order,
//! so results are deterministic for a fixed input and independent of the chunk size.

use crate::table::Table;
use crate::types::Value;
use log::trace;
use std::collections::HashMap;
use std::collections::HashSet;

/// One group produced by [`Table::group_by`]: the joint key and the matching row indices in
/// original row order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowGroup {
    pub key: Vec<Value>,
    pub rows: Vec<usize>,
}

impl Table {
    /// Distinct values of `column` in first-seen order.
    ///
    /// A column that does not exist reads as all-null, so a non-empty table yields `[Null]`.
    pub fn distinct_values(&self, column: &str) -> Vec<Value> {
        let Some(col) = self.column(column) else {
            return if self.is_empty() {
                Vec::new()
            } else {
                vec![Value::Null]
            };
        };

        let mut seen: HashSet<&Value> = HashSet::new();
        let mut out = Vec::new();
        for chunk in self.chunks() {
            trace!("distinct scan of {column}: rows {}..{}", chunk.start, chunk.end);
            for value in &col.values()[chunk] {
                if seen.insert(value) {
                    out.push(value.clone());
                }
            }
        }
        out
    }

    /// Group rows by the joint value of `columns`.
    ///
    /// Groups are returned in the order their first row appears. Missing columns contribute
    /// `Null` to every key. An empty `columns` slice puts every row in one group with an empty
    /// key (or returns no groups for an empty table).
    pub fn group_by(&self, columns: &[&str]) -> Vec<RowGroup> {
        let cols: Vec<_> = columns.iter().map(|name| self.column(name)).collect();

        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<RowGroup> = Vec::new();
        for chunk in self.chunks() {
            trace!(
                "group-by over {} column(s): rows {}..{}",
                cols.len(),
                chunk.start,
                chunk.end
            );
            for row in chunk {
                let key: Vec<Value> = cols
                    .iter()
                    .map(|col| {
                        col.and_then(|c| c.get(row))
                            .cloned()
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                match index.get(&key) {
                    Some(&g) => groups[g].rows.push(row),
                    None => {
                        index.insert(key.clone(), groups.len());
                        groups.push(RowGroup {
                            key,
                            rows: vec![row],
                        });
                    }
                }
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, TableOptions};

    fn sample(chunk: usize) -> Table {
        Table::from_columns_with_options(
            vec![
                Column::new("id", (1..=5).map(Value::from).collect()),
                Column::new(
                    "cat",
                    vec!["A".into(), "B".into(), "A".into(), "C".into(), "B".into()],
                ),
            ],
            TableOptions {
                scan_chunk_rows: chunk,
            },
        )
        .unwrap()
    }

    #[test]
    fn distinct_values_are_first_seen() {
        for chunk in [1, 2, 65_536] {
            assert_eq!(
                sample(chunk).distinct_values("cat"),
                vec![Value::from("A"), Value::from("B"), Value::from("C")]
            );
        }
        assert_eq!(sample(2).distinct_values("missing"), vec![Value::Null]);
        assert!(Table::empty().distinct_values("missing").is_empty());
    }

    #[test]
    fn group_by_keeps_row_order() {
        let groups = sample(2).group_by(&["cat"]);
        let rows: Vec<_> = groups.iter().map(|g| g.rows.clone()).collect();
        assert_eq!(rows, vec![vec![0, 2], vec![1, 4], vec![3]]);
        assert_eq!(groups[2].key, vec![Value::from("C")]);
    }
}
