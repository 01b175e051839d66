//! Persistence layer.
//!
//! [`RowStore`] is the persistence collaborator the engine commits into.
//! Two implementations are provided: [`MemoryStore`], an arena of rows keyed
//! by [`RowKey`], and [`SledStore`], a durable store on sled.

mod config;
mod memory;
mod row;
mod sled_store;

pub mod key;

pub use config::StorageConfig;
pub use memory::MemoryStore;
pub use row::{Row, RowKey};
pub use sled_store::SledStore;

use crate::error::Error;

/// A single write in a commit batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace a row.
    Put(Row),
    /// Remove a row.
    Delete(RowKey),
}

/// Writes applied atomically by [`RowStore::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put.
    pub fn put(&mut self, row: Row) -> &mut Self {
        self.ops.push(WriteOp::Put(row));
        self
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: RowKey) -> &mut Self {
        self.ops.push(WriteOp::Delete(key));
        self
    }

    /// Queued operations.
    pub fn operations(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consume the batch.
    pub fn into_operations(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Row storage with atomic batch commits.
///
/// Transactions buffer their writes and hand them over in one
/// [`WriteBatch`]; a store must apply a batch entirely or not at all.
pub trait RowStore: Send + Sync {
    /// Read a committed row.
    fn get(&self, key: &RowKey) -> Result<Option<Row>, Error>;

    /// All committed rows of an entity type, in primary key order.
    fn scan(&self, entity: &str) -> Result<Vec<Row>, Error>;

    /// Allocate a fresh primary key. Ids are never reused.
    fn allocate_id(&self, entity: &str) -> Result<u64, Error>;

    /// Apply a batch atomically.
    fn apply(&self, batch: WriteBatch) -> Result<(), Error>;

    /// Committed children of a parent, found through a reference attribute.
    fn scan_referencing(
        &self,
        entity: &str,
        foreign_key: &str,
        parent_id: u64,
    ) -> Result<Vec<Row>, Error> {
        Ok(self
            .scan(entity)?
            .into_iter()
            .filter(|row| row.reference(foreign_key) == Some(parent_id))
            .collect())
    }
}
