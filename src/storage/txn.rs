//! # Transaction
//!
//! Shadow paging: an active transaction holds a private copy of every page
//! it has written. Reads inside the transaction consult the shadow overlay
//! first; the pager's cache is only touched at commit, when each shadow is
//! copied back and flushed in page-number order.

use super::pager::Page;
use crate::errors::Error;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    None,
    Active,
    Committed,
    Aborted,
}

pub struct Transaction {
    state: TxnState,
    // BTreeMap keeps the modified set sorted, so commit walks pages in
    // page-number order.
    shadows: BTreeMap<u32, Box<Page>>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            state: TxnState::None,
            shadows: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        if self.is_active() {
            return Err(err!(Transaction, "Transaction already in progress"));
        }
        self.shadows.clear();
        self.state = TxnState::Active;
        Ok(())
    }

    pub fn has_shadow(&self, page_num: u32) -> bool {
        self.shadows.contains_key(&page_num)
    }

    pub fn shadow(&self, page_num: u32) -> Option<&Page> {
        self.shadows.get(&page_num).map(|p| p.as_ref())
    }

    pub fn shadow_mut(&mut self, page_num: u32) -> Option<&mut Page> {
        self.shadows.get_mut(&page_num).map(|p| p.as_mut())
    }

    /// Materializes the copy-on-write overlay entry for `page_num`.
    pub fn install_shadow(&mut self, page_num: u32, contents: Page) {
        self.shadows.insert(page_num, Box::new(contents));
    }

    /// Forgets a shadow without writing it back (used when a merge drops
    /// the underlying page).
    pub fn discard_shadow(&mut self, page_num: u32) {
        self.shadows.remove(&page_num);
    }

    /// Modified pages in ascending page-number order.
    pub fn modified_pages(&self) -> impl Iterator<Item = (u32, &Page)> {
        self.shadows.iter().map(|(num, page)| (*num, page.as_ref()))
    }

    /// Drops all shadows after commit has copied them back.
    pub fn finish_commit(&mut self) -> Result<(), Error> {
        if !self.is_active() {
            return Err(err!(Transaction, "No transaction in progress"));
        }
        self.shadows.clear();
        self.state = TxnState::Committed;
        Ok(())
    }

    /// Discards all shadows without copying them back.
    pub fn rollback(&mut self) -> Result<(), Error> {
        if !self.is_active() {
            return Err(err!(Transaction, "No transaction in progress"));
        }
        self.shadows.clear();
        self.state = TxnState::Aborted;
        Ok(())
    }
}
