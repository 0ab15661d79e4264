//! # Statement Executor
//!
//! Drives the storage engine for the four data statements. Selects return a
//! lazy row sequence that borrows the table until drained; writes return a
//! result status. Semantic failures (duplicate key, missing key, full
//! table) are statuses, not errors.

use crate::errors::Error;
use crate::query::expr::{CompareOp, WhereExpr, WHERE_MAX_NODES};
use crate::query::planner::{plan_select, Plan};
use crate::query::statement::{
    DeleteStatement, ExecuteResult, SelectStatement, Statement, UpdateStatement,
};
use crate::storage::cursor::Cursor;
use crate::storage::row::{Row, EMAIL_MAX_LEN, USERNAME_MAX_LEN};
use crate::storage::table::Table;
use tracing::{debug, warn};

/// Hard cap on rows removed by one bulk delete; matches above it are
/// silently dropped.
pub const DELETE_BATCH_MAX: usize = 1000;

pub enum StatementOutput<'a> {
    Done(ExecuteResult),
    Rows(SelectRows<'a>),
}

pub fn execute_statement(
    table: &mut Table,
    statement: Statement,
) -> Result<StatementOutput<'_>, Error> {
    match statement {
        Statement::Insert(stmt) => execute_insert(table, &stmt.row).map(StatementOutput::Done),
        Statement::Select(stmt) => execute_select(table, stmt).map(StatementOutput::Rows),
        Statement::Update(stmt) => execute_update(table, stmt).map(StatementOutput::Done),
        Statement::Delete(stmt) => execute_delete(table, stmt).map(StatementOutput::Done),
    }
}

fn check_where(where_clause: &Option<WhereExpr>) -> Result<(), Error> {
    if let Some(expr) = where_clause {
        let nodes = expr.node_count();
        if nodes > WHERE_MAX_NODES {
            return Err(err!(
                Query,
                "WHERE expression too complex: {} nodes (max {})",
                nodes,
                WHERE_MAX_NODES
            ));
        }
    }
    Ok(())
}

/// The trivial shape `id = v` as the entire WHERE clause.
fn trivial_id_eq(where_clause: &Option<WhereExpr>) -> Option<u32> {
    match where_clause {
        Some(expr) => match expr.as_id_compare() {
            Some((CompareOp::Eq, key)) => Some(key),
            _ => None,
        },
        None => None,
    }
}

fn where_matches(where_clause: &Option<WhereExpr>, row: &Row) -> bool {
    where_clause.as_ref().map_or(true, |expr| expr.matches(row))
}

pub fn execute_insert(table: &mut Table, row: &Row) -> Result<ExecuteResult, Error> {
    row.validate()?;
    debug!(id = row.id, "Executing insert");

    let (page_num, cell_num, existing_key) = {
        let mut cursor = Cursor::find(table, row.id)?;
        let existing_key = cursor.current_key()?;
        (cursor.page_num, cursor.cell_num, existing_key)
    };
    if existing_key == Some(row.id) {
        return Ok(ExecuteResult::DuplicateKey);
    }

    match table.leaf_node_insert(page_num, cell_num, row) {
        Ok(()) => {
            table.stats.record_insert(row);
            Ok(ExecuteResult::Success)
        }
        Err(Error::TableFull) => Ok(ExecuteResult::TableFull),
        Err(e) => Err(e),
    }
}

pub fn execute_select(
    table: &mut Table,
    stmt: SelectStatement,
) -> Result<SelectRows<'_>, Error> {
    check_where(&stmt.where_clause)?;
    let plan = plan_select(stmt.where_clause.as_ref(), table.statistics());
    debug!(?plan, "Executing select");
    SelectRows::new(table, plan, stmt.where_clause)
}

fn execute_update(table: &mut Table, stmt: UpdateStatement) -> Result<ExecuteResult, Error> {
    check_where(&stmt.where_clause)?;
    if let Some(username) = &stmt.username {
        if username.len() > USERNAME_MAX_LEN {
            return Err(err!(
                Query,
                "Username exceeds max length: {} > {}",
                username.len(),
                USERNAME_MAX_LEN
            ));
        }
    }
    if let Some(email) = &stmt.email {
        if email.len() > EMAIL_MAX_LEN {
            return Err(err!(
                Query,
                "Email exceeds max length: {} > {}",
                email.len(),
                EMAIL_MAX_LEN
            ));
        }
    }

    let apply = |row: &mut Row| {
        if let Some(username) = &stmt.username {
            row.username = username.clone();
        }
        if let Some(email) = &stmt.email {
            row.email = email.clone();
        }
    };

    if let Some(key) = trivial_id_eq(&stmt.where_clause) {
        debug!(key, "Executing update by key");
        let mut cursor = Cursor::find(table, key)?;
        if cursor.current_key()? != Some(key) {
            return Ok(ExecuteResult::KeyNotFound);
        }
        let mut row = cursor.read_row()?;
        apply(&mut row);
        cursor.update_row(&row)?;
        return Ok(ExecuteResult::Success);
    }

    // Full scan, rewriting matches in place. The key never changes, so the
    // tree structure is stable under the cursor.
    debug!("Executing update by scan");
    let mut matched = 0u32;
    let mut cursor = Cursor::start(table)?;
    while !cursor.end_of_table {
        let mut row = cursor.read_row()?;
        if where_matches(&stmt.where_clause, &row) {
            apply(&mut row);
            cursor.update_row(&row)?;
            matched += 1;
        }
        cursor.advance()?;
    }
    if matched == 0 {
        Ok(ExecuteResult::KeyNotFound)
    } else {
        Ok(ExecuteResult::Success)
    }
}

fn execute_delete(table: &mut Table, stmt: DeleteStatement) -> Result<ExecuteResult, Error> {
    check_where(&stmt.where_clause)?;
    if let Some(key) = trivial_id_eq(&stmt.where_clause) {
        debug!(key, "Executing delete by key");
        return delete_by_key(table, key);
    }

    // Deleting restructures leaves, so matching ids are collected first and
    // removed afterwards, in reverse order.
    debug!("Executing delete by scan");
    let mut ids: heapless::Vec<u32, DELETE_BATCH_MAX> = heapless::Vec::new();
    {
        let mut cursor = Cursor::start(table)?;
        while !cursor.end_of_table {
            let row = cursor.read_row()?;
            if where_matches(&stmt.where_clause, &row) && ids.push(row.id).is_err() {
                warn!(limit = DELETE_BATCH_MAX, "Delete batch truncated");
                break;
            }
            cursor.advance()?;
        }
    }
    if ids.is_empty() {
        return Ok(ExecuteResult::KeyNotFound);
    }
    for &id in ids.iter().rev() {
        delete_by_key(table, id)?;
    }
    Ok(ExecuteResult::Success)
}

fn delete_by_key(table: &mut Table, key: u32) -> Result<ExecuteResult, Error> {
    let (page_num, cell_num, hit) = {
        let mut cursor = Cursor::find(table, key)?;
        let hit = cursor.current_key()? == Some(key);
        (cursor.page_num, cursor.cell_num, hit)
    };
    if !hit {
        return Ok(ExecuteResult::KeyNotFound);
    }
    table.leaf_node_delete(page_num, cell_num)?;
    table.stats.record_delete();
    Ok(ExecuteResult::Success)
}

/// Lazy row sequence produced by a select. Holds the table borrowed until
/// dropped, so it must be drained before the next statement.
pub struct SelectRows<'a> {
    cursor: Cursor<'a>,
    filter: Option<WhereExpr>,
    /// Set for index lookups: the probe emits at most its one cell.
    single_probe: bool,
    done: bool,
}

impl<'a> SelectRows<'a> {
    fn new(table: &'a mut Table, plan: Plan, filter: Option<WhereExpr>) -> Result<Self, Error> {
        match plan {
            Plan::FullScan => Ok(SelectRows {
                cursor: Cursor::start(table)?,
                filter,
                single_probe: false,
                done: false,
            }),
            Plan::IndexLookup { key } => {
                let mut cursor = Cursor::find(table, key)?;
                let hit = cursor.current_key()? == Some(key);
                Ok(SelectRows {
                    cursor,
                    filter,
                    single_probe: true,
                    done: !hit,
                })
            }
            Plan::RangeScan { start_key, .. } => Ok(SelectRows {
                cursor: Cursor::find_for_scan(table, start_key)?,
                filter,
                single_probe: false,
                done: false,
            }),
        }
    }
}

impl Iterator for SelectRows<'_> {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.cursor.end_of_table {
                self.done = true;
                return None;
            }
            let row = match self.cursor.read_row() {
                Ok(row) => row,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if self.single_probe {
                self.done = true;
            } else if let Err(e) = self.cursor.advance() {
                self.done = true;
                return Some(Err(e));
            }
            if self.filter.as_ref().map_or(true, |f| f.matches(&row)) {
                return Some(Ok(row));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{Field, Value};
    use crate::query::statement::InsertStatement;
    use crate::storage::table::tests::open_test_table;
    use tempfile::TempDir;

    fn insert(table: &mut Table, id: u32, username: &str, email: &str) -> ExecuteResult {
        execute_insert(table, &Row::new(id, username, email)).unwrap()
    }

    fn select_all(table: &mut Table, where_clause: Option<WhereExpr>) -> Vec<Row> {
        execute_select(table, SelectStatement { where_clause })
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn id_cmp(op: CompareOp, v: u32) -> WhereExpr {
        WhereExpr::basic(Field::Id, op, Value::Int(v))
    }

    fn seeded(n: u32) -> (TempDir, Table) {
        let (dir, mut table) = open_test_table();
        for id in 1..=n {
            assert_eq!(
                insert(&mut table, id, &format!("user{}", id), &format!("user{}@e", id)),
                ExecuteResult::Success
            );
        }
        (dir, table)
    }

    #[test]
    fn persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db1");
        {
            let mut table = Table::open(&path).unwrap();
            insert(&mut table, 1, "u1", "u1@e");
            insert(&mut table, 2, "u2", "u2@e");
            table.close().unwrap();
        }
        let mut table = Table::open(&path).unwrap();
        let rows = select_all(&mut table, None);
        assert_eq!(
            rows,
            vec![Row::new(1, "u1", "u1@e"), Row::new(2, "u2", "u2@e")]
        );
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let (_dir, mut table) = open_test_table();
        assert_eq!(insert(&mut table, 42, "a", "a@e"), ExecuteResult::Success);
        assert_eq!(insert(&mut table, 42, "b", "b@e"), ExecuteResult::DuplicateKey);
        let rows = select_all(&mut table, None);
        assert_eq!(rows, vec![Row::new(42, "a", "a@e")]);
    }

    #[test]
    fn insert_validates_input() {
        let (_dir, mut table) = open_test_table();
        assert!(execute_insert(&mut table, &Row::new(0, "a", "a@e")).is_err());
        assert!(execute_insert(&mut table, &Row::new(1, &"x".repeat(33), "a@e")).is_err());
    }

    #[test]
    fn select_by_key_uses_index_lookup() {
        let (_dir, mut table) = seeded(30);
        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Eq, 17)));
        assert_eq!(rows, vec![Row::new(17, "user17", "user17@e")]);
        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Eq, 99)));
        assert!(rows.is_empty());
    }

    #[test]
    fn select_range_crosses_leaves() {
        let (_dir, mut table) = seeded(30);
        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Ge, 10)));
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, (10..=30).collect::<Vec<_>>());

        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Gt, 28)));
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![29, 30]);
    }

    #[test]
    fn select_with_upper_bound_filters() {
        let (_dir, mut table) = seeded(30);
        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Lt, 4)));
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn where_precedence_scenario() {
        let (_dir, mut table) = open_test_table();
        insert(&mut table, 1, "a", "a@e");
        insert(&mut table, 2, "a", "b@e");
        insert(&mut table, 3, "b", "c@e");
        // (id < 2 OR id > 2) AND username = "a"
        let expr = WhereExpr::and(
            WhereExpr::or(id_cmp(CompareOp::Lt, 2), id_cmp(CompareOp::Gt, 2)),
            WhereExpr::basic(Field::Username, CompareOp::Eq, Value::Str("a".into())),
        );
        let rows = select_all(&mut table, Some(expr));
        assert_eq!(rows, vec![Row::new(1, "a", "a@e")]);
    }

    #[test]
    fn oversized_where_is_rejected() {
        let (_dir, mut table) = seeded(1);
        let mut expr = id_cmp(CompareOp::Eq, 1);
        for _ in 0..WHERE_MAX_NODES {
            expr = WhereExpr::or(expr, id_cmp(CompareOp::Eq, 1));
        }
        assert!(execute_select(&mut table, SelectStatement { where_clause: Some(expr) }).is_err());
    }

    #[test]
    fn update_by_key_touches_marked_fields_only() {
        let (_dir, mut table) = open_test_table();
        insert(&mut table, 5, "x", "x@e");
        let result = execute_update(
            &mut table,
            UpdateStatement {
                username: None,
                email: Some("new@e".into()),
                where_clause: Some(id_cmp(CompareOp::Eq, 5)),
            },
        )
        .unwrap();
        assert_eq!(result, ExecuteResult::Success);
        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Eq, 5)));
        assert_eq!(rows, vec![Row::new(5, "x", "new@e")]);
    }

    #[test]
    fn update_missing_key_is_not_found() {
        let (_dir, mut table) = seeded(3);
        let result = execute_update(
            &mut table,
            UpdateStatement {
                username: Some("y".into()),
                email: None,
                where_clause: Some(id_cmp(CompareOp::Eq, 44)),
            },
        )
        .unwrap();
        assert_eq!(result, ExecuteResult::KeyNotFound);
    }

    #[test]
    fn update_by_scan_rewrites_matches() {
        let (_dir, mut table) = open_test_table();
        insert(&mut table, 1, "a", "a@e");
        insert(&mut table, 2, "b", "b@e");
        insert(&mut table, 3, "a", "c@e");
        let result = execute_update(
            &mut table,
            UpdateStatement {
                username: None,
                email: Some("same@e".into()),
                where_clause: Some(WhereExpr::basic(
                    Field::Username,
                    CompareOp::Eq,
                    Value::Str("a".into()),
                )),
            },
        )
        .unwrap();
        assert_eq!(result, ExecuteResult::Success);
        let rows = select_all(&mut table, None);
        assert_eq!(
            rows,
            vec![
                Row::new(1, "a", "same@e"),
                Row::new(2, "b", "b@e"),
                Row::new(3, "a", "same@e"),
            ]
        );
    }

    #[test]
    fn delete_by_key() {
        let (_dir, mut table) = seeded(3);
        let result = execute_delete(
            &mut table,
            DeleteStatement {
                where_clause: Some(id_cmp(CompareOp::Eq, 2)),
            },
        )
        .unwrap();
        assert_eq!(result, ExecuteResult::Success);
        let ids: Vec<u32> = select_all(&mut table, None).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let result = execute_delete(
            &mut table,
            DeleteStatement {
                where_clause: Some(id_cmp(CompareOp::Eq, 2)),
            },
        )
        .unwrap();
        assert_eq!(result, ExecuteResult::KeyNotFound);
    }

    #[test]
    fn bulk_delete_by_predicate() {
        let (_dir, mut table) = seeded(30);
        let result = execute_delete(
            &mut table,
            DeleteStatement {
                where_clause: Some(id_cmp(CompareOp::Gt, 10)),
            },
        )
        .unwrap();
        assert_eq!(result, ExecuteResult::Success);
        let ids: Vec<u32> = select_all(&mut table, None).iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert_eq!(table.statistics().total_rows, 10);
    }

    #[test]
    fn insert_then_delete_then_select_is_empty() {
        let (_dir, mut table) = open_test_table();
        insert(&mut table, 9, "u", "u@e");
        execute_delete(
            &mut table,
            DeleteStatement {
                where_clause: Some(id_cmp(CompareOp::Eq, 9)),
            },
        )
        .unwrap();
        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Eq, 9)));
        assert!(rows.is_empty());
    }

    #[test]
    fn rollback_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let mut table = Table::open(&path).unwrap();
            for id in 1..=3 {
                insert(&mut table, id, &format!("u{}", id), &format!("u{}@e", id));
            }
            table.begin_transaction().unwrap();
            insert(&mut table, 4, "x", "x@e");
            assert_eq!(select_all(&mut table, None).len(), 4);
            table.rollback().unwrap();
            let ids: Vec<u32> = select_all(&mut table, None).iter().map(|r| r.id).collect();
            assert_eq!(ids, vec![1, 2, 3]);
            table.close().unwrap();
        }
        let mut table = Table::open(&path).unwrap();
        let ids: Vec<u32> = select_all(&mut table, None).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn statement_dispatch() {
        let (_dir, mut table) = open_test_table();
        let out = execute_statement(
            &mut table,
            Statement::Insert(InsertStatement {
                row: Row::new(1, "u", "u@e"),
            }),
        )
        .unwrap();
        assert!(matches!(out, StatementOutput::Done(ExecuteResult::Success)));

        let out = execute_statement(
            &mut table,
            Statement::Select(SelectStatement { where_clause: None }),
        )
        .unwrap();
        match out {
            StatementOutput::Rows(rows) => {
                assert_eq!(rows.collect::<Result<Vec<_>, _>>().unwrap().len(), 1)
            }
            StatementOutput::Done(_) => panic!("select must yield rows"),
        }
    }

    #[test]
    fn filling_the_page_cache_reports_table_full() {
        let (_dir, mut table) = open_test_table();
        let mut full = false;
        for id in 1..=2000u32 {
            match insert(&mut table, id, "u", "u@e") {
                ExecuteResult::Success => {}
                ExecuteResult::TableFull => {
                    full = true;
                    break;
                }
                other => panic!("unexpected result {:?}", other),
            }
        }
        assert!(full, "the bounded cache never filled up");
        // Earlier rows stay readable.
        let rows = select_all(&mut table, Some(id_cmp(CompareOp::Eq, 1)));
        assert_eq!(rows.len(), 1);
    }
}
