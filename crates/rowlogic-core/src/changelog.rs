//! Per-transaction change log of direct edits.
//!
//! Records what the caller changed, not what the engine derived. The
//! propagation pass seeds its work queue from these records. Several edits
//! to the same row are folded into one record:
//!
//! ```text
//! insert + update  -> insert (union of attributes)
//! update + update  -> update (union; first old value wins)
//! insert + delete  -> nothing
//! update + delete  -> delete (old values as of transaction start)
//! ```

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::storage::RowKey;
use crate::value::Value;

/// Kind of change made to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Row created in this transaction.
    Insert,
    /// Existing row modified.
    Update,
    /// Existing row removed.
    Delete,
}

/// A direct change to one row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Row identity.
    pub key: RowKey,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Attributes set directly by the caller.
    pub changed: BTreeSet<String>,
    /// Values before the transaction: changed attributes for updates, the
    /// whole row for deletes, empty for inserts.
    pub old_values: BTreeMap<String, Value>,
}

/// Ordered log of change records, one per row.
#[derive(Debug, Default, Clone)]
pub struct ChangeLog {
    records: IndexMap<RowKey, ChangeRecord>,
}

impl ChangeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an insert of a row with the given attributes.
    pub fn record_insert(&mut self, key: RowKey, attributes: impl IntoIterator<Item = String>) {
        let record = ChangeRecord {
            key: key.clone(),
            kind: ChangeKind::Insert,
            changed: attributes.into_iter().collect(),
            old_values: BTreeMap::new(),
        };
        self.records.insert(key, record);
    }

    /// Record an update: each entry is (attribute, value before this edit).
    pub fn record_update(&mut self, key: RowKey, changes: impl IntoIterator<Item = (String, Value)>) {
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| ChangeRecord {
                key,
                kind: ChangeKind::Update,
                changed: BTreeSet::new(),
                old_values: BTreeMap::new(),
            });

        for (attribute, old) in changes {
            if record.kind == ChangeKind::Update {
                record.old_values.entry(attribute.clone()).or_insert(old);
            }
            record.changed.insert(attribute);
        }
    }

    /// Record a delete; `current` is the row's values just before deletion.
    pub fn record_delete(&mut self, key: RowKey, current: BTreeMap<String, Value>) {
        match self.records.shift_remove(&key) {
            Some(record) if record.kind == ChangeKind::Insert => {}
            previous => {
                let mut old_values = current;
                let mut changed = BTreeSet::new();
                if let Some(record) = previous {
                    old_values.extend(record.old_values);
                    changed = record.changed;
                }
                changed.extend(old_values.keys().cloned());
                let record = ChangeRecord {
                    key: key.clone(),
                    kind: ChangeKind::Delete,
                    changed,
                    old_values,
                };
                self.records.insert(key, record);
            }
        }
    }

    /// Look up the record for a row.
    pub fn get(&self, key: &RowKey) -> Option<&ChangeRecord> {
        self.records.get(key)
    }

    /// Records in the order rows were first touched.
    pub fn records(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.values()
    }

    /// Number of rows with changes.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no changes were recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
