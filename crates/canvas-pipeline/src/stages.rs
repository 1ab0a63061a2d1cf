//! The pure pipeline stages: filter, group-key derivation and partitioning.
//!
//! Each stage is a plain function of its inputs; [`crate::session`] decides when they run.

use canvas_columnar::{Table, Value};
use canvas_expr::RowPredicate;
use log::{debug, warn};
use std::fmt;
use std::time::Instant;

pub type BoxError = Box<dyn std::error::Error>;

/// The row-predicate collaborator: "expression in, matching rows or an error out".
pub trait PredicateEngine {
    /// Row indices of `table` matching `expression`, in row order.
    fn select_rows(&self, table: &Table, expression: &str) -> Result<Vec<usize>, BoxError>;
}

/// The default engine, backed by `canvas-expr`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpressionEngine;

impl PredicateEngine for ExpressionEngine {
    fn select_rows(&self, table: &Table, expression: &str) -> Result<Vec<usize>, BoxError> {
        Ok(RowPredicate::compile(expression, table)?.select_rows(table)?)
    }
}

/// Result of the filter stage. `error` is `None` whenever `result` is actually filtered.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterOutcome {
    pub result: Table,
    pub error: Option<String>,
}

impl FilterOutcome {
    /// The error as the host sees it: empty when there is none.
    pub fn error_message(&self) -> String {
        self.error.clone().unwrap_or_default()
    }
}

pub fn filter_table(table: &Table, expression: &str) -> FilterOutcome {
    filter_table_with(&ExpressionEngine, table, expression)
}

/// Apply `expression` to `table`. An empty expression passes the table through; a failing one
/// falls back to the unfiltered table and reports the failure.
pub fn filter_table_with(
    engine: &dyn PredicateEngine,
    table: &Table,
    expression: &str,
) -> FilterOutcome {
    if expression.is_empty() {
        return FilterOutcome {
            result: table.clone(),
            error: None,
        };
    }

    let started = Instant::now();
    match engine.select_rows(table, expression) {
        Ok(rows) => {
            debug!(
                "filter {expression:?} kept {}/{} rows in {:?}",
                rows.len(),
                table.row_count(),
                started.elapsed()
            );
            FilterOutcome {
                result: table.take(&rows),
                error: None,
            }
        }
        Err(err) => {
            warn!("filter {expression:?} failed: {err}");
            FilterOutcome {
                result: table.clone(),
                error: Some(err.to_string()),
            }
        }
    }
}

/// One group identifier: a value per grouping column, in column order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub Vec<Value>);

impl GroupKey {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// The values joined with ", ".
impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

/// N-ary cartesian product; the last list varies fastest.
///
/// A single list comes back as singletons of its own elements, and any empty list makes the
/// product empty.
pub fn cartesian<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let mut out: Vec<Vec<T>> = first.iter().map(|v| vec![v.clone()]).collect();
    for list in rest {
        out = out
            .iter()
            .flat_map(|prefix| {
                list.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.clone());
                    next
                })
            })
            .collect();
    }
    out
}

/// Group keys to partition by: the distinct values of each column (first-seen order), combined
/// as a cartesian product. No columns means no keys.
pub fn derive_group_keys(table: &Table, group_columns: &[String]) -> Vec<GroupKey> {
    if group_columns.is_empty() {
        return Vec::new();
    }
    let distinct: Vec<Vec<Value>> = group_columns
        .iter()
        .map(|column| table.distinct_values(column))
        .collect();
    cartesian(&distinct).into_iter().map(GroupKey).collect()
}

/// A partition of the filtered table together with the key it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupedTable {
    pub key: GroupKey,
    pub table: Table,
}

/// Split `table` into one sub-table per group actually present in the data.
///
/// Partitions come in the order their first row appears, which is not necessarily the order of
/// `group_keys`; match them up through [`GroupedTable::key`]. Returns nothing unless both
/// `group_columns` and `group_keys` are non-empty. Keys with no rows produce no partition.
pub fn partition(
    table: &Table,
    group_columns: &[String],
    group_keys: &[GroupKey],
) -> Vec<GroupedTable> {
    if group_columns.is_empty() || group_keys.is_empty() {
        return Vec::new();
    }
    let columns: Vec<&str> = group_columns.iter().map(String::as_str).collect();
    table
        .group_by(&columns)
        .into_iter()
        .map(|group| GroupedTable {
            key: GroupKey(group.key),
            table: table.take(&group.rows),
        })
        .collect()
}
