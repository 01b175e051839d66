//! In-memory row arena.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::{Mutex, RwLock};

use super::{Row, RowKey, RowStore, WriteBatch, WriteOp};
use crate::error::Error;

/// Reference index entry: (entity, attribute, parent id, child id).
type ReferenceEntry = (String, String, u64, u64);

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<RowKey, Row>,
    references: BTreeSet<ReferenceEntry>,
}

impl Tables {
    fn put(&mut self, row: Row) {
        self.remove(&row.key);
        for (attribute, parent_id) in row.references() {
            self.references.insert((
                row.key.entity.clone(),
                attribute.to_string(),
                parent_id,
                row.key.id,
            ));
        }
        self.rows.insert(row.key.clone(), row);
    }

    fn remove(&mut self, key: &RowKey) {
        let Some(old) = self.rows.remove(key) else {
            return;
        };
        for (attribute, parent_id) in old.references() {
            self.references.remove(&(
                key.entity.clone(),
                attribute.to_string(),
                parent_id,
                key.id,
            ));
        }
    }
}

/// Row arena keyed by (entity, id), with an index over reference attributes.
///
/// A batch is applied under a single write lock, so readers see either all
/// of a commit or none of it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_ids: Mutex<HashMap<String, u64>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows.
    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.read().rows.is_empty()
    }
}

impl RowStore for MemoryStore {
    fn get(&self, key: &RowKey) -> Result<Option<Row>, Error> {
        Ok(self.tables.read().rows.get(key).cloned())
    }

    fn scan(&self, entity: &str) -> Result<Vec<Row>, Error> {
        let start = RowKey::new(entity, 0);
        let end = RowKey::new(entity, u64::MAX);
        Ok(self
            .tables
            .read()
            .rows
            .range(start..=end)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn allocate_id(&self, entity: &str) -> Result<u64, Error> {
        let mut next_ids = self.next_ids.lock();
        let next = next_ids.entry(entity.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        Ok(id)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), Error> {
        let mut tables = self.tables.write();
        for op in batch.into_operations() {
            match op {
                WriteOp::Put(row) => tables.put(row),
                WriteOp::Delete(key) => tables.remove(&key),
            }
        }
        Ok(())
    }

    fn scan_referencing(
        &self,
        entity: &str,
        foreign_key: &str,
        parent_id: u64,
    ) -> Result<Vec<Row>, Error> {
        let start = (entity.to_string(), foreign_key.to_string(), parent_id, 0);
        let end = (entity.to_string(), foreign_key.to_string(), parent_id, u64::MAX);
        let tables = self.tables.read();
        Ok(tables
            .references
            .range(start..=end)
            .filter_map(|(_, _, _, id)| tables.rows.get(&RowKey::new(entity, *id)).cloned())
            .collect())
    }
}
