//! The per-view pipeline: parameter cells in, derived tables out.
//!
//! ```text
//! table ──► base_table ──► filtered_table ──► group_keys ──► grouped_tables
//!                 filter ──┘     group_columns ──┴──────────────┘
//! ```
//!
//! Every input change marks its dependents dirty and runs one synchronous pass that recomputes
//! them in dependency order. Changes made while a pass is running (for example by a subscriber)
//! are queued and each gets its own pass afterwards.

use crate::cell::SyncedCell;
use crate::channel::{names, SyncChannel, Syncable};
use crate::graph::{CycleError, DependencyGraph};
use crate::spec::CanvasSpec;
use crate::stages::{
    derive_group_keys, filter_table_with, partition, ExpressionEngine, GroupKey, GroupedTable,
    PredicateEngine,
};
use crate::store::{Derived, Subscription};
use bytes::Bytes;
use canvas_columnar::{decode_ipc_with_options, DecodeError, Table, TableOptions};
use log::{debug, error};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineNode {
    TableBuffer,
    Filter,
    GroupColumns,
    BaseTable,
    FilteredTable,
    GroupKeys,
    GroupedTables,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub table: TableOptions,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to decode table: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Cycle(#[from] CycleError<PipelineNode>),
}

fn pipeline_graph() -> DependencyGraph<PipelineNode> {
    use PipelineNode::*;
    let mut graph = DependencyGraph::new();
    graph.update_dependencies(BaseTable, [TableBuffer]);
    graph.update_dependencies(FilteredTable, [BaseTable, Filter]);
    graph.update_dependencies(GroupKeys, [FilteredTable, GroupColumns]);
    graph.update_dependencies(GroupedTables, [FilteredTable, GroupColumns, GroupKeys]);
    graph
}

struct SessionCore {
    options: PipelineOptions,
    engine: Box<dyn PredicateEngine>,
    graph: RefCell<DependencyGraph<PipelineNode>>,
    pending: RefCell<VecDeque<PipelineNode>>,
    running: Cell<bool>,
    ready: Cell<bool>,
    last_error: RefCell<Option<PipelineError>>,
    /// One slot per `set_table` call in progress, innermost last. The first decode after a call
    /// starts fills its slot.
    table_outcomes: RefCell<Vec<Option<Result<(), PipelineError>>>>,

    table: SyncedCell<Bytes>,
    filter: SyncedCell<String>,
    filter_error: SyncedCell<String>,
    group_columns: SyncedCell<Vec<String>>,
    selected: SyncedCell<Vec<String>>,
    canvas_spec: SyncedCell<CanvasSpec>,

    base_table: Derived<Table>,
    filtered_table: Derived<Table>,
    group_keys: Derived<Vec<GroupKey>>,
    grouped_tables: Derived<Vec<GroupedTable>>,
}

impl SessionCore {
    /// Queue a pass for a changed input and drain the queue unless a pass is already running.
    fn input_changed(&self, node: PipelineNode) {
        if !self.ready.get() {
            return;
        }
        self.pending.borrow_mut().push_back(node);
        if self.running.get() {
            debug!("{node:?} changed during a pass; queued");
            return;
        }

        self.running.set(true);
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(node) = next else {
                break;
            };
            self.graph.borrow_mut().mark_dirty(node);
            self.finish_pass(node);
        }
        self.running.set(false);
    }

    fn full_pass(&self) {
        self.running.set(true);
        self.graph.borrow_mut().mark_all_dirty();
        self.finish_pass(PipelineNode::TableBuffer);
        self.running.set(false);
    }

    /// Run one pass. `last_error` changes only when the pass fails or decodes a table, so passes
    /// for other inputs never hide a decode failure.
    fn finish_pass(&self, trigger: PipelineNode) {
        match self.run_pass() {
            Ok(decoded) => {
                if decoded {
                    *self.last_error.borrow_mut() = None;
                }
            }
            Err(err) => {
                error!("pipeline pass triggered by {trigger:?} failed: {err}");
                *self.last_error.borrow_mut() = Some(err);
            }
        }
    }

    fn record_table_outcome(&self, outcome: Result<(), PipelineError>) {
        let mut outcomes = self.table_outcomes.borrow_mut();
        if let Some(slot) = outcomes.last_mut() {
            if slot.is_none() {
                *slot = Some(outcome);
            }
        }
    }

    /// Returns whether the table was decoded.
    fn run_pass(&self) -> Result<bool, PipelineError> {
        let order = {
            let mut graph = self.graph.borrow_mut();
            let order = graph.calc_order_for_dirty()?;
            graph.clear_dirty();
            order
        };
        let started = Instant::now();
        let mut decoded = false;

        for node in &order {
            match node {
                PipelineNode::BaseTable => {
                    let buffer = self.table.get();
                    let table = match decode_ipc_with_options(&buffer, self.options.table) {
                        Ok(table) => table,
                        Err(err) => {
                            let err = PipelineError::from(err);
                            self.record_table_outcome(Err(err.clone()));
                            return Err(err);
                        }
                    };
                    self.record_table_outcome(Ok(()));
                    decoded = true;
                    debug!(
                        "decoded {} rows x {} columns from {} bytes",
                        table.row_count(),
                        table.column_count(),
                        buffer.len()
                    );
                    self.base_table.set(table);
                }
                PipelineNode::FilteredTable => {
                    let base = self.base_table.get();
                    let expression = self.filter.get();
                    let outcome = filter_table_with(self.engine.as_ref(), &base, &expression);
                    let message = outcome.error_message();
                    if self.filter_error.with(|current| *current != message) {
                        self.filter_error.set(message);
                    }
                    self.filtered_table.set(outcome.result);
                }
                PipelineNode::GroupKeys => {
                    let keys = self.filtered_table.with(|table| {
                        self.group_columns
                            .with(|columns| derive_group_keys(table, columns))
                    });
                    self.group_keys.set(keys);
                }
                PipelineNode::GroupedTables => {
                    let groups = self.filtered_table.with(|table| {
                        self.group_columns.with(|columns| {
                            self.group_keys
                                .with(|keys| partition(table, columns, keys))
                        })
                    });
                    self.grouped_tables.set(groups);
                }
                PipelineNode::TableBuffer | PipelineNode::Filter | PipelineNode::GroupColumns => {}
            }
        }

        debug!("recomputed {order:?} in {:?}", started.elapsed());
        Ok(decoded)
    }
}

/// One view's pipeline, linked to the host through a [`SyncChannel`].
///
/// Construction links every parameter cell and runs a full pass. Dropping the session (or
/// calling [`close`](Self::close)) unsubscribes everything and unlinks the cells.
pub struct CanvasSession {
    core: Rc<SessionCore>,
    subscriptions: Vec<Subscription>,
}

impl CanvasSession {
    pub fn new(channel: Rc<dyn SyncChannel>, options: PipelineOptions) -> Self {
        Self::with_engine(channel, options, ExpressionEngine)
    }

    /// Like [`new`](Self::new) with a custom filter-expression engine.
    pub fn with_engine(
        channel: Rc<dyn SyncChannel>,
        options: PipelineOptions,
        engine: impl PredicateEngine + 'static,
    ) -> Self {
        let core = Rc::new(SessionCore {
            options,
            engine: Box::new(engine),
            graph: RefCell::new(pipeline_graph()),
            pending: RefCell::new(VecDeque::new()),
            running: Cell::new(false),
            ready: Cell::new(false),
            last_error: RefCell::new(None),
            table_outcomes: RefCell::new(Vec::new()),

            table: SyncedCell::new(names::TABLE, Bytes::new(), Rc::clone(&channel)),
            filter: SyncedCell::new(names::FILTER, String::new(), Rc::clone(&channel)),
            filter_error: SyncedCell::new(names::FILTER_ERROR, String::new(), Rc::clone(&channel)),
            group_columns: SyncedCell::new(names::GROUP_COLUMNS, Vec::new(), Rc::clone(&channel)),
            selected: SyncedCell::new(names::SELECTED, Vec::new(), Rc::clone(&channel)),
            canvas_spec: SyncedCell::new(names::CANVAS_SPEC, CanvasSpec::default(), channel),

            base_table: Derived::new(Table::empty()),
            filtered_table: Derived::new(Table::empty()),
            group_keys: Derived::new(Vec::new()),
            grouped_tables: Derived::new(Vec::new()),
        });

        // Subscribing fires once immediately; those calls are ignored until `ready` is set.
        let subscriptions = vec![
            watch(&core, &core.table, PipelineNode::TableBuffer),
            watch(&core, &core.filter, PipelineNode::Filter),
            watch(&core, &core.group_columns, PipelineNode::GroupColumns),
        ];

        core.ready.set(true);
        core.full_pass();

        Self {
            core,
            subscriptions,
        }
    }

    /// Unsubscribe the pipeline and unlink every cell from the channel.
    pub fn close(self) {
        drop(self);
    }

    pub fn table(&self) -> &SyncedCell<Bytes> {
        &self.core.table
    }

    pub fn filter(&self) -> &SyncedCell<String> {
        &self.core.filter
    }

    /// The last filter failure, or an empty string.
    ///
    /// Written once per pass with the final message and only when it changed, so host observers
    /// see one update per change and never a transient clear before a new error.
    pub fn filter_error(&self) -> &SyncedCell<String> {
        &self.core.filter_error
    }

    pub fn group_columns(&self) -> &SyncedCell<Vec<String>> {
        &self.core.group_columns
    }

    pub fn selected(&self) -> &SyncedCell<Vec<String>> {
        &self.core.selected
    }

    pub fn canvas_spec(&self) -> &SyncedCell<CanvasSpec> {
        &self.core.canvas_spec
    }

    pub fn base_table(&self) -> &Derived<Table> {
        &self.core.base_table
    }

    pub fn filtered_table(&self) -> &Derived<Table> {
        &self.core.filtered_table
    }

    pub fn group_keys(&self) -> &Derived<Vec<GroupKey>> {
        &self.core.group_keys
    }

    /// One entry per group present in the filtered data, each tagged with its key.
    pub fn grouped_tables(&self) -> &Derived<Vec<GroupedTable>> {
        &self.core.grouped_tables
    }

    /// The error of the most recent failed pass, kept until the next successful table decode.
    pub fn last_error(&self) -> Option<PipelineError> {
        self.core.last_error.borrow().clone()
    }

    /// Replace the table buffer. Decode failures are returned and leave every derived value as
    /// it was.
    ///
    /// Called from inside a subscriber, the pass is queued and this returns `Ok(())`.
    pub fn set_table(&self, buffer: impl Into<Bytes>) -> Result<(), PipelineError> {
        if self.core.running.get() {
            self.core.table.set(buffer.into());
            return Ok(());
        }
        self.core.table_outcomes.borrow_mut().push(None);
        self.core.table.set(buffer.into());
        let outcome = self.core.table_outcomes.borrow_mut().pop().flatten();
        outcome.unwrap_or(Ok(()))
    }

    pub fn set_filter(&self, expression: impl Into<String>) {
        self.core.filter.set(expression.into());
    }

    pub fn set_group_columns(&self, columns: Vec<String>) {
        self.core.group_columns.set(columns);
    }
}

impl Drop for CanvasSession {
    fn drop(&mut self) {
        self.core.ready.set(false);
        self.subscriptions.clear();
    }
}

/// Re-run the pipeline whenever `cell` changes.
fn watch<T: Syncable + Clone + 'static>(
    core: &Rc<SessionCore>,
    cell: &SyncedCell<T>,
    node: PipelineNode,
) -> Subscription {
    let weak: Weak<SessionCore> = Rc::downgrade(core);
    cell.subscribe(move |_| {
        if let Some(core) = weak.upgrade() {
            core.input_changed(node);
        }
    })
}
