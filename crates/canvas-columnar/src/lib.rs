//! Immutable columnar tables for the canvas query pipeline.
//!
//! This crate focuses on:
//! - A typed, immutable table snapshot with O(1) column lookup by name (absent columns are `None`,
//!   never an error).
//! - Decoding Arrow IPC buffers into that table, fixing each column's type once at decode time.
//! - Chunked bulk scans (distinct values, group-by) whose results do not depend on the chunk size.

#![forbid(unsafe_code)]

pub mod arrow;
mod binning;
mod group;
mod table;
mod types;

pub use crate::arrow::{decode_ipc, decode_ipc_with_options, DecodeError};
pub use crate::binning::BINNABLE_DISTINCT_FRACTION;
pub use crate::group::RowGroup;
pub use crate::table::{Column, ColumnSchema, Table, TableError, TableOptions};
pub use crate::types::{ColumnType, Value};
