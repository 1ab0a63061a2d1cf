//! Reactive query pipeline behind a canvas view.
//!
//! A [`CanvasSession`] owns the view's parameter cells (`table`, `filter`, `group_columns`, ...),
//! each mirrored to the host through a [`SyncChannel`], and derives from them:
//! - the decoded base table,
//! - the filtered table (falling back to the unfiltered one when the filter fails),
//! - the group keys (cartesian product of the grouping columns' distinct values),
//! - the grouped tables (one per group present in the filtered data).
//!
//! All recomputation is synchronous and single-threaded.

#![forbid(unsafe_code)]

mod cell;
mod channel;
mod graph;
mod selection;
mod session;
mod spec;
mod stages;
mod store;

pub use crate::cell::SyncedCell;
pub use crate::channel::{
    names, InMemoryChannel, ObserverFn, ObserverId, SyncChannel, SyncError, SyncValue, Syncable,
};
pub use crate::graph::{CycleError, DependencyGraph, GraphNode};
pub use crate::selection::select_all;
pub use crate::session::{CanvasSession, PipelineError, PipelineNode, PipelineOptions};
pub use crate::spec::{default_instances_per_page, CanvasDataType, CanvasSpec, UnknownDataType};
pub use crate::stages::{
    cartesian, derive_group_keys, filter_table, filter_table_with, partition, BoxError,
    ExpressionEngine, FilterOutcome, GroupKey, GroupedTable, PredicateEngine,
};
pub use crate::store::{Derived, Store, Subscription};

pub use canvas_columnar::{ColumnType, Table, TableOptions, Value};
