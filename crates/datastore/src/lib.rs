//! The datastore crate.
//!
//! This crate writes loosely structured rows into sqlite tables whose schema is not known ahead of time.  Rows are
//! column name to scalar value maps, and rows in the same batch may have different columns.  Rather than asking for a
//! schema up front, writes are attempted against whatever the table looks like right now, and when the store reports
//! that the table or one of the columns is missing, the schema is repaired and the write is tried again.
//!
//! There are 3 primary pieces:
//!
//! - The store, a narrow trait over the relational engine ([RelationalStore]).  It classifies failures into a
//!   [FailureKind] so nothing above it matches on error text.
//! - The schema repairer ([create_table], [add_columns]), which only ever creates tables and appends columns.
//! - The [AdaptiveWriter], which owns the insert/replace/update logic and the repair-then-retry loop.
//!
//! [Database] is the writer over an owned sqlite connection, which is what most callers want.
//!
//! Each repair runs at most once per call.  If the store still reports the same problem afterwards, the error is
//! surfaced rather than retried, since it means the repair did not take.
mod errors;
mod options;
mod row;
mod schema;
mod sql;
mod sqlite;
mod store;
mod writer;

pub use errors::*;
pub use options::*;
pub use row::*;
pub use schema::{add_columns, create_table};
pub use sqlite::*;
pub use store::*;
pub use writer::*;
