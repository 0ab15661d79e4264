//! Parsed statement surface. The tokenizer and parser live outside this
//! crate; execution consumes these structures and yields an
//! [`ExecuteResult`] plus, for selects, a row sequence.

use super::expr::WhereExpr;
use crate::storage::row::Row;

/// Core statement types accepted by the executor.
#[derive(Debug)]
pub enum Statement {
    Insert(InsertStatement),
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

#[derive(Debug)]
pub struct InsertStatement {
    pub row: Row,
}

#[derive(Debug)]
pub struct SelectStatement {
    pub where_clause: Option<WhereExpr>,
}

/// Only the fields carried as `Some` are written.
#[derive(Debug)]
pub struct UpdateStatement {
    pub username: Option<String>,
    pub email: Option<String>,
    pub where_clause: Option<WhereExpr>,
}

#[derive(Debug)]
pub struct DeleteStatement {
    pub where_clause: Option<WhereExpr>,
}

/// Outcome of executing a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteResult {
    Success,
    DuplicateKey,
    TableFull,
    KeyNotFound,
}
