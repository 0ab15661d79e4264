//! # Table Statistics
//!
//! Cardinality and row-count estimates feeding the query planner. Distinct
//! values are approximated by hashed presence in fixed bit tables, so the
//! numbers are advisory: a stale or missing estimate degrades plan quality,
//! never correctness.

use super::row::Row;
use std::fmt;

/// Slots per presence bit table.
pub const STAT_HASH_SLOTS: usize = 1024;

pub struct TableStatistics {
    pub total_rows: u32,
    pub id_min: u32,
    pub id_max: u32,
    pub id_cardinality: u32,
    pub username_cardinality: u32,
    pub email_cardinality: u32,
    /// False until the first ANALYZE or the first row seen.
    pub is_valid: bool,
    id_seen: [bool; STAT_HASH_SLOTS],
    username_seen: [bool; STAT_HASH_SLOTS],
    email_seen: [bool; STAT_HASH_SLOTS],
}

/// Multiply-by-31 rolling hash over the string bytes, reduced per step.
fn string_slot(s: &str) -> usize {
    let mut hash: u32 = 0;
    for &byte in s.as_bytes() {
        hash = (hash.wrapping_mul(31).wrapping_add(byte as u32)) % STAT_HASH_SLOTS as u32;
    }
    hash as usize
}

fn id_slot(id: u32) -> usize {
    (id % STAT_HASH_SLOTS as u32) as usize
}

fn mark(seen: &mut [bool; STAT_HASH_SLOTS], slot: usize, cardinality: &mut u32) {
    if !seen[slot] {
        seen[slot] = true;
        *cardinality += 1;
    }
}

impl TableStatistics {
    pub fn new() -> Self {
        TableStatistics {
            total_rows: 0,
            id_min: 0,
            id_max: 0,
            id_cardinality: 0,
            username_cardinality: 0,
            email_cardinality: 0,
            is_valid: false,
            id_seen: [false; STAT_HASH_SLOTS],
            username_seen: [false; STAT_HASH_SLOTS],
            email_seen: [false; STAT_HASH_SLOTS],
        }
    }

    pub fn reset(&mut self) {
        *self = TableStatistics::new();
    }

    pub fn record_insert(&mut self, row: &Row) {
        if self.total_rows == 0 {
            self.id_min = row.id;
            self.id_max = row.id;
        } else {
            self.id_min = self.id_min.min(row.id);
            self.id_max = self.id_max.max(row.id);
        }
        self.total_rows += 1;
        mark(&mut self.id_seen, id_slot(row.id), &mut self.id_cardinality);
        mark(
            &mut self.username_seen,
            string_slot(&row.username),
            &mut self.username_cardinality,
        );
        mark(
            &mut self.email_seen,
            string_slot(&row.email),
            &mut self.email_cardinality,
        );
        self.is_valid = true;
    }

    /// Presence bits cannot be un-set, so cardinalities and id bounds go
    /// stale after deletes until the next ANALYZE.
    pub fn record_delete(&mut self) {
        self.total_rows = self.total_rows.saturating_sub(1);
    }
}

impl Default for TableStatistics {
    fn default() -> Self {
        TableStatistics::new()
    }
}

impl fmt::Display for TableStatistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.is_valid {
            return writeln!(f, "statistics not collected (run analyze)");
        }
        writeln!(f, "total_rows: {}", self.total_rows)?;
        writeln!(f, "id range: [{}, {}]", self.id_min, self.id_max)?;
        writeln!(f, "id cardinality: ~{}", self.id_cardinality)?;
        writeln!(f, "username cardinality: ~{}", self.username_cardinality)?;
        writeln!(f, "email cardinality: ~{}", self.email_cardinality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u32, username: &str, email: &str) -> Row {
        Row::new(id, username, email)
    }

    #[test]
    fn starts_invalid() {
        let stats = TableStatistics::new();
        assert!(!stats.is_valid);
        assert_eq!(stats.total_rows, 0);
    }

    #[test]
    fn insert_tracks_bounds_and_cardinality() {
        let mut stats = TableStatistics::new();
        stats.record_insert(&row(5, "a", "a@e"));
        stats.record_insert(&row(2, "b", "b@e"));
        stats.record_insert(&row(9, "a", "c@e"));
        assert!(stats.is_valid);
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.id_min, 2);
        assert_eq!(stats.id_max, 9);
        assert_eq!(stats.id_cardinality, 3);
        // "a" repeats, so only two distinct usernames.
        assert_eq!(stats.username_cardinality, 2);
        assert_eq!(stats.email_cardinality, 3);
    }

    #[test]
    fn delete_only_decrements_total() {
        let mut stats = TableStatistics::new();
        stats.record_insert(&row(1, "a", "a@e"));
        stats.record_insert(&row(2, "b", "b@e"));
        stats.record_delete();
        assert_eq!(stats.total_rows, 1);
        assert_eq!(stats.id_cardinality, 2);
    }

    #[test]
    fn reset_invalidates() {
        let mut stats = TableStatistics::new();
        stats.record_insert(&row(1, "a", "a@e"));
        stats.reset();
        assert!(!stats.is_valid);
        assert_eq!(stats.total_rows, 0);
        assert_eq!(stats.id_cardinality, 0);
    }

    #[test]
    fn string_slot_in_range() {
        for s in ["", "a", "alice", "a-rather-long-username-value"] {
            assert!(string_slot(s) < STAT_HASH_SLOTS);
        }
    }
}
