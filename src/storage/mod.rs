//! Disk-backed storage engine: pager, node codec, B+tree, transactions and
//! table statistics.

pub mod cursor;
pub mod node;
pub mod pager;
pub mod row;
pub mod stats;
pub mod table;
pub mod txn;
