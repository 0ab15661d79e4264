//! # tinydb
//!
//! A minimal single-table relational storage engine: fixed-schema rows in a
//! disk-backed B+tree of 4 KiB pages, with shadow-paging transactions and a
//! tiny cost-based planner. The SQL front end (tokenizer, parser, REPL) is
//! an external collaborator; this crate consumes parsed statements and
//! yields result statuses and row sequences.

#[macro_use]
mod errors;
pub mod executor;
pub mod query;
pub mod storage;

pub use errors::Error;
pub use executor::{execute_statement, SelectRows, StatementOutput};
pub use query::expr::{CompareOp, Field, Value, WhereExpr};
pub use query::statement::{
    DeleteStatement, ExecuteResult, InsertStatement, SelectStatement, Statement, UpdateStatement,
};
pub use storage::row::Row;
pub use storage::table::Table;
