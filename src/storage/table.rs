//! # Table
//!
//! The table owns the pager, the transaction and the statistics, and
//! implements every structural mutation of the B-tree: insert with leaf and
//! internal splits, root creation, delete with the empty-leaf merge policy.
//!
//! Nodes refer to each other by page number, never by reference; the page
//! cache is the arena and all ownership lives there. Mutations that touch
//! several pages work from a 4 KiB snapshot of the source page, then write
//! each destination through the transaction-aware write path one at a time.

use super::cursor::Cursor;
use super::node::{
    self, NodeType, INTERNAL_NODE_MAX_CELLS, INVALID_PAGE_NUM, LEAF_NODE_LEFT_SPLIT_COUNT,
    LEAF_NODE_MAX_CELLS, LEAF_NODE_RIGHT_SPLIT_COUNT,
};
use super::pager::{Page, Pager};
use super::row::{serialize_row, Row};
use super::stats::TableStatistics;
use super::txn::Transaction;
use crate::errors::Error;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct Table {
    pub path: PathBuf,
    pub root_page_num: u32,
    pub(crate) pager: Pager,
    pub(crate) txn: Transaction,
    pub(crate) stats: TableStatistics,
}

impl Table {
    /// Opens (or creates) the single table stored at `path`. A fresh file
    /// gets a leaf root at page 0; an existing one gets its statistics
    /// recomputed, since the file format has nowhere to persist them.
    pub fn open(path: &Path) -> Result<Table, Error> {
        let mut pager = Pager::open(path)?;
        let fresh = pager.num_pages() == 0;
        if fresh {
            // New database file. Initialize page 0 as leaf node.
            let root = pager.get_mut(0)?;
            node::initialize_leaf_node(root);
            node::set_node_root(root, true);
        }

        let mut table = Table {
            path: path.to_path_buf(),
            root_page_num: 0,
            pager,
            txn: Transaction::new(),
            stats: TableStatistics::new(),
        };
        if !fresh {
            table.analyze()?;
        }
        info!(path = %table.path.display(), "Opened table");
        Ok(table)
    }

    /// Flushes every cached page and releases the file. An active
    /// transaction is committed first.
    pub fn close(mut self) -> Result<(), Error> {
        if self.txn.is_active() {
            warn!("Table closed with an active transaction; auto-committing");
            self.commit()?;
        }
        self.pager.close()
    }

    pub fn statistics(&self) -> &TableStatistics {
        &self.stats
    }

    // Transaction surface

    pub fn begin_transaction(&mut self) -> Result<(), Error> {
        debug!("Beginning transaction");
        self.txn.begin()
    }

    /// Copies every shadow page back into the cache and flushes it, in
    /// page-number order. Durability means "commit returned Ok": a crash
    /// mid-commit may leave a prefix of pages persisted.
    pub fn commit(&mut self) -> Result<(), Error> {
        if !self.txn.is_active() {
            return Err(err!(Transaction, "No transaction in progress"));
        }
        let Table { pager, txn, .. } = self;
        let mut written = 0;
        for (page_num, shadow) in txn.modified_pages() {
            pager.get_mut(page_num)?.copy_from_slice(shadow);
            pager.flush(page_num)?;
            written += 1;
        }
        debug!(pages = written, "Committed transaction");
        txn.finish_commit()
    }

    /// Discards every shadow page.
    pub fn rollback(&mut self) -> Result<(), Error> {
        debug!("Rolling back transaction");
        self.txn.rollback()
    }

    // Transaction-aware page access

    /// Reads consult the shadow overlay first, so a transaction observes
    /// its own writes while the cache stays pristine.
    pub(crate) fn page_for_read(&mut self, page_num: u32) -> Result<&Page, Error> {
        if self.txn.is_active() && self.txn.has_shadow(page_num) {
            return self
                .txn
                .shadow(page_num)
                .ok_or_else(|| err!(Storage, "Shadow for page {} disappeared", page_num));
        }
        self.pager.get(page_num)
    }

    /// Outside a transaction, writes go straight to the cache (implicit
    /// auto-commit mode). Inside one, the first write to a page
    /// materializes its shadow copy.
    pub(crate) fn page_for_write(&mut self, page_num: u32) -> Result<&mut Page, Error> {
        if !self.txn.is_active() {
            return self.pager.get_mut(page_num);
        }
        if !self.txn.has_shadow(page_num) {
            let copy = *self.pager.get(page_num)?;
            self.txn.install_shadow(page_num, copy);
        }
        self.txn
            .shadow_mut(page_num)
            .ok_or_else(|| err!(Storage, "Shadow for page {} disappeared", page_num))
    }

    fn snapshot(&mut self, page_num: u32) -> Result<Page, Error> {
        Ok(*self.page_for_read(page_num)?)
    }

    /// Largest key reachable from `page_num`: the last cell of a leaf, or
    /// recursively the right child of an internal node.
    pub(crate) fn node_max_key(&mut self, page_num: u32) -> Result<u32, Error> {
        let (node_type, num_cells, right_child) = {
            let page = self.page_for_read(page_num)?;
            (
                node::get_node_type(page)?,
                node::leaf_node_num_cells(page),
                node::internal_node_right_child(page),
            )
        };
        match node_type {
            NodeType::Leaf => {
                if num_cells == 0 {
                    return Err(err!(Storage, "Max key of empty leaf {}", page_num));
                }
                let page = self.page_for_read(page_num)?;
                Ok(node::leaf_node_key(page, num_cells as usize - 1))
            }
            NodeType::Internal => {
                if right_child == INVALID_PAGE_NUM {
                    return Err(err!(
                        Storage,
                        "Max key of internal node {} with no right child",
                        page_num
                    ));
                }
                self.node_max_key(right_child)
            }
        }
    }

    // Insert path

    /// Inserts `row` at the position located by a prior find. Splits the
    /// leaf when it is already at capacity.
    pub(crate) fn leaf_node_insert(
        &mut self,
        page_num: u32,
        cell_num: u32,
        row: &Row,
    ) -> Result<(), Error> {
        let num_cells = node::leaf_node_num_cells(self.page_for_read(page_num)?);
        if num_cells as usize >= LEAF_NODE_MAX_CELLS {
            warn!(page_num, num_cells, "Node full. Splitting a leaf node...");
            return self.leaf_node_split_and_insert(page_num, cell_num, row);
        }

        let row_bin = serialize_row(row);
        let page = self.page_for_write(page_num)?;
        if cell_num < num_cells {
            // Make room for new cell
            node::leaf_shift_cells_right(page, cell_num as usize, num_cells as usize);
        }
        node::set_leaf_node_num_cells(page, num_cells + 1);
        node::set_leaf_node_key(page, cell_num as usize, row.id);
        node::set_leaf_node_value(page, cell_num as usize, &row_bin);
        Ok(())
    }

    /// Create a new node and move half the cells over.
    /// Insert the new value in one of the two nodes.
    /// Update parent or create a new parent.
    fn leaf_node_split_and_insert(
        &mut self,
        page_num: u32,
        cell_num: u32,
        row: &Row,
    ) -> Result<(), Error> {
        debug!(page_num, "Splitting leaf node...");
        let old_max = self.node_max_key(page_num)?;
        let new_page_num = self.pager.allocate();
        let old = self.snapshot(page_num)?;
        let row_bin = serialize_row(row);

        // The old leaf's sibling becomes the new leaf, and the new leaf's
        // sibling becomes whatever used to be the old leaf's sibling.
        {
            let new_page = self.page_for_write(new_page_num)?;
            node::initialize_leaf_node(new_page);
            node::set_node_parent(new_page, node::node_parent(&old));
            node::set_leaf_node_next_leaf(new_page, node::leaf_node_next_leaf(&old));
        }

        // All existing keys plus the new key are divided evenly between the
        // old (left) and new (right) nodes. Starting from the right, move
        // each key to its correct position.
        for i in (0..=LEAF_NODE_MAX_CELLS).rev() {
            let dest_page_num = if i >= LEAF_NODE_LEFT_SPLIT_COUNT {
                new_page_num
            } else {
                page_num
            };
            let index_within_node = i % LEAF_NODE_LEFT_SPLIT_COUNT;

            let dest = self.page_for_write(dest_page_num)?;
            if i == cell_num as usize {
                node::set_leaf_node_key(dest, index_within_node, row.id);
                node::set_leaf_node_value(dest, index_within_node, &row_bin);
            } else if i > cell_num as usize {
                node::copy_leaf_cell(dest, index_within_node, &old, i - 1);
            } else {
                node::copy_leaf_cell(dest, index_within_node, &old, i);
            }
        }

        // Update cell count on both leaf nodes.
        {
            let old_page = self.page_for_write(page_num)?;
            node::set_leaf_node_num_cells(old_page, LEAF_NODE_LEFT_SPLIT_COUNT as u32);
            node::set_leaf_node_next_leaf(old_page, new_page_num);
        }
        {
            let new_page = self.page_for_write(new_page_num)?;
            node::set_leaf_node_num_cells(new_page, LEAF_NODE_RIGHT_SPLIT_COUNT as u32);
        }

        if node::is_node_root(&old) {
            self.create_new_root(new_page_num)
        } else {
            let parent_page_num = node::node_parent(&old);
            let new_max = self.node_max_key(page_num)?;
            {
                let parent = self.page_for_write(parent_page_num)?;
                node::update_internal_node_key(parent, old_max, new_max);
            }
            self.internal_node_insert(parent_page_num, new_page_num)
        }
    }

    /// Splits the root: the old root is copied to a fresh page and becomes
    /// the left child, the given page becomes the right child, and page 0
    /// is re-initialized as an internal node over the pair.
    fn create_new_root(&mut self, right_child_page_num: u32) -> Result<(), Error> {
        debug!(right_child_page_num, "Creating a new root");
        let root_page_num = self.root_page_num;
        let root_snapshot = self.snapshot(root_page_num)?;
        let root_was_internal = node::get_node_type(&root_snapshot)? == NodeType::Internal;

        // Materialize the right child before allocating the left child, or
        // both would resolve to the same fresh page number.
        if root_was_internal {
            // When an internal root splits, its new sibling arrives here
            // uninitialized.
            let right = self.page_for_write(right_child_page_num)?;
            node::initialize_internal_node(right);
        } else {
            self.page_for_write(right_child_page_num)?;
        }
        let left_child_page_num = self.pager.allocate();

        // Old root copied to new page, becomes left child.
        {
            let left = self.page_for_write(left_child_page_num)?;
            left.copy_from_slice(&root_snapshot);
            node::set_node_root(left, false);
            node::set_node_parent(left, root_page_num);
        }
        if root_was_internal {
            // The moved node's children must point at its new page number.
            let num_keys = node::internal_node_num_keys(&root_snapshot);
            for i in 0..=num_keys {
                let child_page = node::internal_node_child(&root_snapshot, i)?;
                let child = self.page_for_write(child_page)?;
                node::set_node_parent(child, left_child_page_num);
            }
        }
        let left_max = self.node_max_key(left_child_page_num)?;

        // Root node is a new internal node with one key and two children.
        {
            let root = self.page_for_write(root_page_num)?;
            node::initialize_internal_node(root);
            node::set_node_root(root, true);
            node::set_internal_node_num_keys(root, 1);
            node::set_internal_node_cell_child(root, 0, left_child_page_num);
            node::set_internal_node_key(root, 0, left_max);
            node::set_internal_node_right_child(root, right_child_page_num);
        }
        {
            let right = self.page_for_write(right_child_page_num)?;
            node::set_node_parent(right, root_page_num);
        }
        Ok(())
    }

    /// Adds a new child/key pair to `parent_page_num`. The rightmost child
    /// pointer is stored separately from the cells, so a child whose max
    /// key exceeds the current right child's max replaces it.
    pub(crate) fn internal_node_insert(
        &mut self,
        parent_page_num: u32,
        child_page_num: u32,
    ) -> Result<(), Error> {
        debug!(parent_page_num, child_page_num, "Inserting child into internal node");
        let child_max_key = self.node_max_key(child_page_num)?;
        let (original_num_keys, right_child_page_num, index) = {
            let parent = self.page_for_read(parent_page_num)?;
            (
                node::internal_node_num_keys(parent),
                node::internal_node_right_child(parent),
                node::internal_node_find_child(parent, child_max_key),
            )
        };

        if original_num_keys as usize >= INTERNAL_NODE_MAX_CELLS {
            return self.internal_node_split_and_insert(parent_page_num, child_page_num);
        }

        // An internal node with an invalid right child is empty.
        if right_child_page_num == INVALID_PAGE_NUM {
            let parent = self.page_for_write(parent_page_num)?;
            node::set_internal_node_right_child(parent, child_page_num);
            return Ok(());
        }

        let right_child_max = self.node_max_key(right_child_page_num)?;
        let parent_snapshot = self.snapshot(parent_page_num)?;
        let parent = self.page_for_write(parent_page_num)?;
        node::set_internal_node_num_keys(parent, original_num_keys + 1);

        if child_max_key > right_child_max {
            // Replace right child.
            node::set_internal_node_cell_child(
                parent,
                original_num_keys as usize,
                right_child_page_num,
            );
            node::set_internal_node_key(parent, original_num_keys as usize, right_child_max);
            node::set_internal_node_right_child(parent, child_page_num);
        } else {
            // Make room for the new cell.
            for i in ((index + 1)..=original_num_keys).rev() {
                node::copy_internal_cell(parent, i as usize, &parent_snapshot, i as usize - 1);
            }
            node::set_internal_node_cell_child(parent, index as usize, child_page_num);
            node::set_internal_node_key(parent, index as usize, child_max_key);
        }
        Ok(())
    }

    /// Splits an overfull internal node: a new sibling takes the upper half
    /// of the children (the right child plus the cells above the midpoint),
    /// then the pending child lands on whichever side owns its key range.
    fn internal_node_split_and_insert(
        &mut self,
        parent_page_num: u32,
        child_page_num: u32,
    ) -> Result<(), Error> {
        debug!(parent_page_num, child_page_num, "Splitting internal node...");
        let mut old_page_num = parent_page_num;
        let old_max = self.node_max_key(old_page_num)?;
        let child_max = self.node_max_key(child_page_num)?;
        let new_page_num = self.pager.allocate();
        let splitting_root = node::is_node_root(self.page_for_read(old_page_num)?);

        let parent_page_num = if splitting_root {
            self.create_new_root(new_page_num)?;
            // The old content now lives at the root's first child.
            old_page_num =
                node::internal_node_child(self.page_for_read(self.root_page_num)?, 0)?;
            self.root_page_num
        } else {
            let parent = node::node_parent(self.page_for_read(old_page_num)?);
            let new_page = self.page_for_write(new_page_num)?;
            node::initialize_internal_node(new_page);
            parent
        };

        // Move the old right child into the new sibling.
        let (mut num_keys, old_right_child) = {
            let old = self.page_for_read(old_page_num)?;
            (
                node::internal_node_num_keys(old),
                node::internal_node_right_child(old),
            )
        };
        {
            let old = self.page_for_write(old_page_num)?;
            node::set_internal_node_right_child(old, INVALID_PAGE_NUM);
        }
        self.internal_node_insert(new_page_num, old_right_child)?;
        {
            let moved = self.page_for_write(old_right_child)?;
            node::set_node_parent(moved, new_page_num);
        }

        // Move the cells above the midpoint after it.
        for i in ((INTERNAL_NODE_MAX_CELLS / 2 + 1)..INTERNAL_NODE_MAX_CELLS).rev() {
            let cur_page_num =
                node::internal_node_cell_child(self.page_for_read(old_page_num)?, i);
            self.internal_node_insert(new_page_num, cur_page_num)?;
            {
                let moved = self.page_for_write(cur_page_num)?;
                node::set_node_parent(moved, new_page_num);
            }
            num_keys -= 1;
            let old = self.page_for_write(old_page_num)?;
            node::set_internal_node_num_keys(old, num_keys);
        }

        // The highest surviving cell's child becomes the old node's new
        // right child.
        {
            let promoted = node::internal_node_cell_child(
                self.page_for_read(old_page_num)?,
                num_keys as usize - 1,
            );
            let old = self.page_for_write(old_page_num)?;
            node::set_internal_node_right_child(old, promoted);
            num_keys -= 1;
            node::set_internal_node_num_keys(old, num_keys);
        }

        // Insert the pending child on whichever side now owns its range.
        let max_after_split = self.node_max_key(old_page_num)?;
        let destination_page_num = if child_max < max_after_split {
            old_page_num
        } else {
            new_page_num
        };
        self.internal_node_insert(destination_page_num, child_page_num)?;
        {
            let child = self.page_for_write(child_page_num)?;
            node::set_node_parent(child, destination_page_num);
        }

        // Refresh the separator for the old node, then hand the new sibling
        // to the parent.
        let old_new_max = self.node_max_key(old_page_num)?;
        {
            let parent = self.page_for_write(parent_page_num)?;
            node::update_internal_node_key(parent, old_max, old_new_max);
        }
        if !splitting_root {
            let old_parent = node::node_parent(self.page_for_read(old_page_num)?);
            self.internal_node_insert(old_parent, new_page_num)?;
            let new_page = self.page_for_write(new_page_num)?;
            node::set_node_parent(new_page, old_parent);
        }
        Ok(())
    }

    // Delete path

    /// Removes the cell located by a prior find. When the leaf runs empty
    /// (and is not the root), a merge with its left sibling is attempted.
    pub(crate) fn leaf_node_delete(&mut self, page_num: u32, cell_num: u32) -> Result<(), Error> {
        let remaining = {
            let page = self.page_for_write(page_num)?;
            let num_cells = node::leaf_node_num_cells(page);
            node::leaf_shift_cells_left(page, cell_num as usize, num_cells as usize);
            node::set_leaf_node_num_cells(page, num_cells - 1);
            num_cells - 1
        };
        let is_root = node::is_node_root(self.page_for_read(page_num)?);
        if remaining == 0 && !is_root {
            self.try_merge_empty_leaf(page_num)?;
        }
        Ok(())
    }

    /// The deliberately simple rebalancing policy: an empty leaf merges into
    /// its left sibling only, and only when that sibling has room. With no
    /// left sibling the empty leaf stays in place. No redistribution.
    fn try_merge_empty_leaf(&mut self, page_num: u32) -> Result<(), Error> {
        let parent_page_num = node::node_parent(self.page_for_read(page_num)?);
        let parent = self.snapshot(parent_page_num)?;
        let num_keys = node::internal_node_num_keys(&parent);

        let mut child_index = None;
        for i in 0..=num_keys {
            if node::internal_node_child(&parent, i)? == page_num {
                child_index = Some(i);
                break;
            }
        }
        let child_index = child_index.ok_or_else(|| {
            err!(
                Storage,
                "Leaf {} not listed under its parent {}",
                page_num,
                parent_page_num
            )
        })?;
        if child_index == 0 {
            return Ok(());
        }

        let left_page_num = node::internal_node_child(&parent, child_index - 1)?;
        let left_cells = node::leaf_node_num_cells(self.page_for_read(left_page_num)?);
        let right_cells = node::leaf_node_num_cells(self.page_for_read(page_num)?);
        if left_cells + right_cells > LEAF_NODE_MAX_CELLS as u32 {
            return Ok(());
        }
        self.leaf_node_merge(parent_page_num, left_page_num, page_num, child_index)
    }

    /// Appends the right leaf's cells to the left sibling, rewires the
    /// sibling chain, removes the right entry from the parent and abandons
    /// the right page's cache slot. The page number is leaked: there is no
    /// free list.
    fn leaf_node_merge(
        &mut self,
        parent_page_num: u32,
        left_page_num: u32,
        right_page_num: u32,
        right_index: u32,
    ) -> Result<(), Error> {
        debug!(left_page_num, right_page_num, "Merging leaf into left sibling");
        let right = self.snapshot(right_page_num)?;
        let right_cells = node::leaf_node_num_cells(&right);
        {
            let left = self.page_for_write(left_page_num)?;
            let left_cells = node::leaf_node_num_cells(left);
            for i in 0..right_cells {
                node::copy_leaf_cell(left, (left_cells + i) as usize, &right, i as usize);
            }
            node::set_leaf_node_num_cells(left, left_cells + right_cells);
            node::set_leaf_node_next_leaf(left, node::leaf_node_next_leaf(&right));
        }
        self.remove_internal_entry(parent_page_num, right_index)?;
        self.txn.discard_shadow(right_page_num);
        self.pager.drop_slot(right_page_num);
        Ok(())
    }

    /// Removes the child at `child_index` from an internal node by
    /// left-shifting the subsequent cells. Removing the right child
    /// promotes the last cell's child in its place.
    fn remove_internal_entry(
        &mut self,
        parent_page_num: u32,
        child_index: u32,
    ) -> Result<(), Error> {
        let snapshot = self.snapshot(parent_page_num)?;
        let num_keys = node::internal_node_num_keys(&snapshot);
        if num_keys == 0 {
            return Err(err!(
                Storage,
                "Cannot remove a child from empty internal node {}",
                parent_page_num
            ));
        }
        let parent = self.page_for_write(parent_page_num)?;
        if child_index == num_keys {
            let promoted = node::internal_node_cell_child(&snapshot, num_keys as usize - 1);
            node::set_internal_node_right_child(parent, promoted);
        } else {
            for i in child_index..(num_keys - 1) {
                node::copy_internal_cell(parent, i as usize, &snapshot, i as usize + 1);
            }
        }
        node::set_internal_node_num_keys(parent, num_keys - 1);
        Ok(())
    }

    /// Merges two sibling internal nodes: the separator key is pulled down
    /// onto the left node's right child, the right node's cells follow, and
    /// the right entry leaves the parent. Kept as a primitive; the delete
    /// policy never invokes it.
    pub fn internal_node_merge(
        &mut self,
        left_page_num: u32,
        right_page_num: u32,
    ) -> Result<(), Error> {
        let parent_page_num = node::node_parent(self.page_for_read(left_page_num)?);
        let parent = self.snapshot(parent_page_num)?;
        let parent_keys = node::internal_node_num_keys(&parent);

        let mut left_index = None;
        for i in 0..=parent_keys {
            if node::internal_node_child(&parent, i)? == left_page_num {
                left_index = Some(i);
                break;
            }
        }
        let left_index = left_index.ok_or_else(|| {
            err!(
                Storage,
                "Node {} not listed under its parent {}",
                left_page_num,
                parent_page_num
            )
        })?;
        if left_index >= parent_keys {
            return Err(err!(
                Storage,
                "Node {} has no right sibling to merge with",
                left_page_num
            ));
        }
        if node::internal_node_child(&parent, left_index + 1)? != right_page_num {
            return Err(err!(
                Storage,
                "Nodes {} and {} are not adjacent siblings",
                left_page_num,
                right_page_num
            ));
        }
        let separator = node::internal_node_key(&parent, left_index as usize);

        let right = self.snapshot(right_page_num)?;
        let right_keys = node::internal_node_num_keys(&right);
        let (left_keys, left_right_child) = {
            let left = self.page_for_read(left_page_num)?;
            (
                node::internal_node_num_keys(left),
                node::internal_node_right_child(left),
            )
        };
        if (left_keys + right_keys + 1) as usize > INTERNAL_NODE_MAX_CELLS {
            return Err(err!(
                Storage,
                "Merging nodes {} and {} would overflow the left node",
                left_page_num,
                right_page_num
            ));
        }

        {
            let left = self.page_for_write(left_page_num)?;
            // Pull the separator down: the left node's right child becomes a
            // regular cell bounded by it.
            node::set_internal_node_cell_child(left, left_keys as usize, left_right_child);
            node::set_internal_node_key(left, left_keys as usize, separator);
            for i in 0..right_keys {
                node::copy_internal_cell(left, (left_keys + 1 + i) as usize, &right, i as usize);
            }
            node::set_internal_node_num_keys(left, left_keys + 1 + right_keys);
            node::set_internal_node_right_child(left, node::internal_node_right_child(&right));
        }
        // Reattach the absorbed children.
        for i in 0..=right_keys {
            let child_page = node::internal_node_child(&right, i)?;
            let child = self.page_for_write(child_page)?;
            node::set_node_parent(child, left_page_num);
        }

        // The left node now covers the merged range, so it takes over the
        // right sibling's separator before the entry is dropped.
        if left_index + 1 < parent_keys {
            let right_separator = node::internal_node_key(&parent, left_index as usize + 1);
            let parent_page = self.page_for_write(parent_page_num)?;
            node::set_internal_node_key(parent_page, left_index as usize, right_separator);
        }
        self.remove_internal_entry(parent_page_num, left_index + 1)?;
        self.txn.discard_shadow(right_page_num);
        self.pager.drop_slot(right_page_num);
        Ok(())
    }

    // Maintenance

    /// Rebuilds the statistics with a full scan.
    pub fn analyze(&mut self) -> Result<(), Error> {
        debug!("Analyzing table...");
        self.stats.reset();
        let mut cursor = Cursor::start(self)?;
        while !cursor.end_of_table {
            let row = cursor.read_row()?;
            cursor.table.stats.record_insert(&row);
            cursor.advance()?;
        }
        self.stats.is_valid = true;
        debug!(total_rows = self.stats.total_rows, "Analyze complete");
        Ok(())
    }

    /// Indented dump of the tree structure, for the `print_tree` meta
    /// operation.
    pub fn render_tree(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        self.render_node(self.root_page_num, 0, &mut out)?;
        Ok(out)
    }

    fn render_node(&mut self, page_num: u32, indent: usize, out: &mut String) -> Result<(), Error> {
        let page = self.snapshot(page_num)?;
        let pad = "  ".repeat(indent);
        match node::get_node_type(&page)? {
            NodeType::Leaf => {
                let num_cells = node::leaf_node_num_cells(&page);
                let _ = writeln!(out, "{}- leaf (size {})", pad, num_cells);
                for i in 0..num_cells {
                    let _ = writeln!(out, "{}  - {}", pad, node::leaf_node_key(&page, i as usize));
                }
            }
            NodeType::Internal => {
                let num_keys = node::internal_node_num_keys(&page);
                let _ = writeln!(out, "{}- internal (size {})", pad, num_keys);
                for i in 0..num_keys {
                    let child = node::internal_node_child(&page, i)?;
                    self.render_node(child, indent + 1, out)?;
                    let _ = writeln!(out, "{}  - key {}", pad, node::internal_node_key(&page, i as usize));
                }
                let right_child = node::internal_node_right_child(&page);
                if right_child != INVALID_PAGE_NUM {
                    self.render_node(right_child, indent + 1, out)?;
                }
            }
        }
        Ok(())
    }
}
