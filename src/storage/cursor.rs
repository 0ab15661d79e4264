//! # Cursor
//!
//! A cursor identifies a position in the table: a leaf page, a cell index,
//! and an end-of-table flag. Cursors drive both scans and the
//! locate-then-mutate paths of insert, update and delete.

use super::node::{self, NodeType, INVALID_PAGE_NUM};
use super::row::{deserialize_row, serialize_row, Row};
use super::table::Table;
use crate::errors::Error;

pub struct Cursor<'a> {
    pub table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: u32,
    /// Indicates a position one past the last element.
    pub end_of_table: bool,
}

/// Descends from `page_num` to the leaf that owns `key`, returning the leaf
/// page and the cell index of the key (or its insert position).
fn find_position(table: &mut Table, mut page_num: u32, key: u32) -> Result<(u32, u32), Error> {
    loop {
        let page = table.page_for_read(page_num)?;
        match node::get_node_type(page)? {
            NodeType::Leaf => {
                let num_cells = node::leaf_node_num_cells(page);

                // Binary search
                let mut min_index = 0;
                let mut one_past_max_index = num_cells;
                while one_past_max_index != min_index {
                    let index = (min_index + one_past_max_index) / 2;
                    let key_at_index = node::leaf_node_key(page, index as usize);
                    if key == key_at_index {
                        return Ok((page_num, index));
                    }
                    if key < key_at_index {
                        one_past_max_index = index;
                    } else {
                        min_index = index + 1;
                    }
                }
                return Ok((page_num, min_index));
            }
            NodeType::Internal => {
                let child_index = node::internal_node_find_child(page, key);
                let child = node::internal_node_child(page, child_index)?;
                if child == INVALID_PAGE_NUM {
                    return Err(err!(
                        Storage,
                        "Descent from page {} reached an uninitialized child",
                        page_num
                    ));
                }
                page_num = child;
            }
        }
    }
}

impl<'a> Cursor<'a> {
    /// A cursor at the leftmost leaf's first cell. `end_of_table` is set
    /// iff that leaf holds no cells.
    pub fn start(table: &'a mut Table) -> Result<Self, Error> {
        let root = table.root_page_num;
        let (page_num, cell_num) = find_position(table, root, 0)?;
        let num_cells = node::leaf_node_num_cells(table.page_for_read(page_num)?);

        Ok(Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: num_cells == 0,
        })
    }

    /// A cursor at `key`'s cell, or at the position where `key` would be
    /// inserted.
    pub fn find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let root = table.root_page_num;
        let (page_num, cell_num) = find_position(table, root, key)?;

        Ok(Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: false,
        })
    }

    /// Like [`Cursor::find`], but settled onto a readable cell: a position
    /// past a leaf's last cell moves forward through the sibling chain.
    /// Range scans start here so they never read an insert position.
    pub fn find_for_scan(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let mut cursor = Cursor::find(table, key)?;
        cursor.settle()?;
        Ok(cursor)
    }

    /// Key under the cursor, or `None` when the cursor sits past the leaf's
    /// last cell.
    pub fn current_key(&mut self) -> Result<Option<u32>, Error> {
        let page = self.table.page_for_read(self.page_num)?;
        if self.cell_num < node::leaf_node_num_cells(page) {
            Ok(Some(node::leaf_node_key(page, self.cell_num as usize)))
        } else {
            Ok(None)
        }
    }

    pub fn read_row(&mut self) -> Result<Row, Error> {
        let page = self.table.page_for_read(self.page_num)?;
        deserialize_row(node::leaf_node_value(page, self.cell_num as usize))
    }

    /// Overwrites the row under the cursor in place. The key is unchanged,
    /// so no rebalancing is needed.
    pub fn update_row(&mut self, row: &Row) -> Result<(), Error> {
        let row_bin = serialize_row(row);
        let page = self.table.page_for_write(self.page_num)?;
        node::set_leaf_node_value(page, self.cell_num as usize, &row_bin);
        Ok(())
    }

    pub fn advance(&mut self) -> Result<(), Error> {
        self.cell_num += 1;
        self.settle()
    }

    /// Moves forward through `next_leaf` links until the cursor sits on a
    /// cell or runs off the rightmost leaf. Empty leaves left behind by the
    /// merge policy are hopped over.
    fn settle(&mut self) -> Result<(), Error> {
        loop {
            let page = self.table.page_for_read(self.page_num)?;
            if self.cell_num < node::leaf_node_num_cells(page) {
                return Ok(());
            }
            let next = node::leaf_node_next_leaf(page);
            if next == 0 {
                self.end_of_table = true;
                return Ok(());
            }
            self.page_num = next;
            self.cell_num = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::table::tests::open_test_table;

    #[test]
    fn start_on_empty_table_is_end() {
        let (_dir, mut table) = open_test_table();
        let cursor = Cursor::start(&mut table).unwrap();
        assert!(cursor.end_of_table);
    }

    #[test]
    fn find_positions_within_single_leaf() {
        let (_dir, mut table) = open_test_table();
        for id in [10u32, 20, 30] {
            let row = Row::new(id, "u", "u@e");
            let (page, cell) = {
                let mut c = Cursor::find(&mut table, id).unwrap();
                assert_ne!(c.current_key().unwrap(), Some(id));
                (c.page_num, c.cell_num)
            };
            table.leaf_node_insert(page, cell, &row).unwrap();
        }

        let mut c = Cursor::find(&mut table, 20).unwrap();
        assert_eq!(c.current_key().unwrap(), Some(20));
        assert_eq!(c.cell_num, 1);

        // A missing key lands on its insert position.
        let mut c = Cursor::find(&mut table, 25).unwrap();
        assert_eq!(c.cell_num, 2);
        assert_eq!(c.current_key().unwrap(), Some(30));
    }

    #[test]
    fn scan_visits_rows_in_key_order() {
        let (_dir, mut table) = open_test_table();
        for id in [3u32, 1, 2] {
            let row = Row::new(id, "u", "u@e");
            let (page, cell) = {
                let c = Cursor::find(&mut table, id).unwrap();
                (c.page_num, c.cell_num)
            };
            table.leaf_node_insert(page, cell, &row).unwrap();
        }

        let mut cursor = Cursor::start(&mut table).unwrap();
        let mut seen = Vec::new();
        while !cursor.end_of_table {
            seen.push(cursor.read_row().unwrap().id);
            cursor.advance().unwrap();
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn find_for_scan_settles_past_leaf_end() {
        let (_dir, mut table) = open_test_table();
        for id in 1..=2u32 {
            let row = Row::new(id, "u", "u@e");
            let (page, cell) = {
                let c = Cursor::find(&mut table, id).unwrap();
                (c.page_num, c.cell_num)
            };
            table.leaf_node_insert(page, cell, &row).unwrap();
        }
        // Past the greatest key there is nothing to scan.
        let cursor = Cursor::find_for_scan(&mut table, 99).unwrap();
        assert!(cursor.end_of_table);
    }
}
