//! Shared in-memory tables standing in for the ledger database.
//!
//! Aggregate and event rows are kept as JSON keyed by primary key; outbox
//! records are kept typed so relay tests can assert on them directly. Every
//! handle is a cheap clone over the same tables.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use ledger_outbox_core::outbox::OutboxRecord;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Table name used for outbox statements.
pub const OUTBOX_TABLE: &str = "outbox";

/// One write, as staged by a scope before commit.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Insert a JSON row into a named table.
    Row {
        /// Target table.
        table: &'static str,
        /// Primary key.
        key: Uuid,
        /// Row contents.
        row: serde_json::Value,
    },
    /// Insert an outbox record.
    Outbox(OutboxRecord),
}

impl Statement {
    /// Target table name.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Row { table, .. } => *table,
            Self::Outbox(_) => OUTBOX_TABLE,
        }
    }

    const fn key(&self) -> Uuid {
        match self {
            Self::Row { key, .. } => *key,
            Self::Outbox(record) => record.outbox_id,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub(crate) fail_next_begin: bool,
    pub(crate) fail_next_commit: bool,
    pub(crate) fail_next_claim: bool,
    pub(crate) failing_tables: HashSet<&'static str>,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) rows: HashMap<&'static str, BTreeMap<Uuid, serde_json::Value>>,
    pub(crate) outbox: BTreeMap<Uuid, OutboxRecord>,
    pub(crate) faults: Faults,
}

impl Tables {
    /// Check `statement` against committed rows and the statements queued before it.
    pub(crate) fn check(&self, statement: &Statement, earlier: &[Statement]) -> Result<(), String> {
        let table = statement.table();
        if self.faults.failing_tables.contains(table) {
            return Err(format!("injected failure writing to {table}"));
        }

        let key = statement.key();
        let committed = match statement {
            Statement::Row { table, .. } => {
                self.rows.get(table).is_some_and(|rows| rows.contains_key(&key))
            }
            Statement::Outbox(_) => self.outbox.contains_key(&key),
        };
        let staged = earlier.iter().any(|s| s.table() == table && s.key() == key);
        if committed || staged {
            return Err(format!("duplicate key {key} violates primary key of {table}"));
        }

        Ok(())
    }

    pub(crate) fn apply(&mut self, statement: Statement) {
        match statement {
            Statement::Row { table, key, row } => {
                self.rows.entry(table).or_default().insert(key, row);
            }
            Statement::Outbox(record) => {
                self.outbox.insert(record.outbox_id, record);
            }
        }
    }
}

/// In-memory database shared by units of work, repositories and the outbox store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDatabase {
    /// Empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    /// The next `begin_with_tx*` fails with `TxStartFailed`.
    pub fn fail_next_begin(&self) {
        self.lock().faults.fail_next_begin = true;
    }

    /// The next commit fails with `CommitFailed` and discards its writes.
    pub fn fail_next_commit(&self) {
        self.lock().faults.fail_next_commit = true;
    }

    /// The next `claim_batch` fails with a database error.
    pub fn fail_next_claim(&self) {
        self.lock().faults.fail_next_claim = true;
    }

    /// Every write to `table` fails until [`heal`](Self::heal) is called.
    pub fn fail_writes_to(&self, table: &'static str) {
        self.lock().faults.failing_tables.insert(table);
    }

    /// Clear every injected fault.
    pub fn heal(&self) {
        self.lock().faults = Faults::default();
    }

    /// Committed rows of `table`, in key order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        self.lock()
            .rows
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed rows in `table` (outbox included).
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        let tables = self.lock();
        if table == OUTBOX_TABLE {
            return tables.outbox.len();
        }
        tables.rows.get(table).map_or(0, BTreeMap::len)
    }

    /// Committed outbox records, oldest first.
    #[must_use]
    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        let mut records: Vec<_> = self.lock().outbox.values().cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.outbox_id));
        records
    }

    /// One committed outbox record.
    #[must_use]
    pub fn outbox_record(&self, outbox_id: Uuid) -> Option<OutboxRecord> {
        self.lock().outbox.get(&outbox_id).cloned()
    }

    /// Insert an outbox record as if some writer had committed it.
    pub fn seed_outbox(&self, record: OutboxRecord) {
        self.lock().outbox.insert(record.outbox_id, record);
    }
}
