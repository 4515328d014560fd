//! Additive schema evolution.
//!
//! There is no migration history. At startup the persisted schema is compared with
//! [`tables::EXPECTED`]; missing tables are created, missing columns are added and
//! backfilled, missing indexes are built. A column the code no longer declares stays in
//! place with its values. If it is `NOT NULL` without a default it would refuse every
//! insert, so the table is rebuilt with that constraint relaxed.
//!
//! Older data is repaired where the current code depends on it: NULLs in required
//! columns are filled, containers with tied positions are renumbered, and rows that
//! duplicate a unique key are removed before the index is built.

mod evolve;
pub mod tables;

use serde::Serialize;

pub use evolve::{evolve, evolve_with};

/// What one evolution run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvolutionReport {
    pub tables_created: Vec<String>,
    /// `(table, column)` pairs.
    pub columns_added: Vec<(String, String)>,
    pub indexes_created: Vec<String>,
    /// Tables recreated because an undeclared column refused inserts.
    pub tables_rebuilt: Vec<String>,
    /// `(table, rows)` moved apart because they shared a position with a sibling.
    pub positions_renumbered: Vec<(String, u64)>,
    /// `(table, rows)` deleted so a unique index could be built.
    pub duplicates_removed: Vec<(String, u64)>,
}

impl EvolutionReport {
    /// True when the store already matched the expected schema.
    pub fn is_empty(&self) -> bool {
        self.tables_created.is_empty()
            && self.columns_added.is_empty()
            && self.indexes_created.is_empty()
            && self.tables_rebuilt.is_empty()
            && self.positions_renumbered.is_empty()
            && self.duplicates_removed.is_empty()
    }
}
