//! Filter expressions for canvas tables.
//!
//! Expressions are JavaScript-flavoured row predicates such as `d.age > 10 && op.lower(d.name)
//! == "ann"`, optionally written as an arrow function (`d => ...`). Columns are referenced through
//! the row variable (`d.col`, `d["col name"]`) and helpers through the `op.` namespace.

#![forbid(unsafe_code)]

mod eval;
mod parser;

pub use eval::{eval_constant, filter_rows, truthy, ExprError, ExprResult, RowPredicate};
pub use parser::{
    parse, BinaryOp, Expr, LogicalOp, UnaryOp, DEFAULT_ROW_VARIABLE, FUNCTION_NAMESPACE,
    MAX_NESTING_DEPTH,
};
