//! Durable row store on sled.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};

use super::{key, Row, RowKey, RowStore, StorageConfig, WriteBatch, WriteOp};
use crate::error::Error;

/// Tree name for row data.
const ROWS_TREE: &str = "rows";

/// Tree name for the reference index.
const REFERENCES_TREE: &str = "references";

/// Sled-backed row store.
///
/// Rows are stored as JSON under [`key::encode`] keys. Every reference
/// attribute is indexed under [`key::reference_key`] in a second tree, so
/// children of a parent are found without scanning their entity type. Both
/// trees are written in one sled transaction.
pub struct SledStore {
    db: Db,
    rows: Tree,
    references: Tree,
    flush_on_commit: bool,
}

impl SledStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let rows = db.open_tree(ROWS_TREE)?;
        let references = db.open_tree(REFERENCES_TREE)?;
        tracing::debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "opened sled row store"
        );
        Ok(Self {
            db,
            rows,
            references,
            flush_on_commit: config.flushes_on_commit(),
        })
    }

    fn decode_row(key_bytes: &[u8], value: &[u8]) -> Result<Row, Error> {
        let row: Row = serde_json::from_slice(value)?;
        match key::decode(key_bytes) {
            Some(key) if key == row.key => Ok(row),
            _ => Err(Error::InvalidKey),
        }
    }

    fn execute_put(
        rows: &TransactionalTree,
        references: &TransactionalTree,
        row: &Row,
    ) -> Result<(), ConflictableTransactionError<Error>> {
        let value = serde_json::to_vec(row).map_err(abort)?;
        if let Some(old) = rows.insert(key::encode(&row.key), value)? {
            Self::unindex(references, &old)?;
        }
        for (attribute, parent_id) in row.references() {
            let index_key = key::reference_key(&row.key.entity, attribute, parent_id, row.key.id);
            references.insert(index_key, &[])?;
        }
        Ok(())
    }

    fn execute_delete(
        rows: &TransactionalTree,
        references: &TransactionalTree,
        row_key: &RowKey,
    ) -> Result<(), ConflictableTransactionError<Error>> {
        if let Some(old) = rows.remove(key::encode(row_key))? {
            Self::unindex(references, &old)?;
        }
        Ok(())
    }

    /// Drop the index entries of a row's previous version.
    fn unindex(
        references: &TransactionalTree,
        old: &[u8],
    ) -> Result<(), ConflictableTransactionError<Error>> {
        let old: Row = serde_json::from_slice(old).map_err(abort)?;
        for (attribute, parent_id) in old.references() {
            references.remove(key::reference_key(
                &old.key.entity,
                attribute,
                parent_id,
                old.key.id,
            ))?;
        }
        Ok(())
    }
}

fn abort(err: serde_json::Error) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(Error::Serialization(err))
}

impl RowStore for SledStore {
    fn get(&self, key: &RowKey) -> Result<Option<Row>, Error> {
        let key_bytes = key::encode(key);
        match self.rows.get(&key_bytes)? {
            Some(bytes) => Ok(Some(Self::decode_row(&key_bytes, &bytes)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, entity: &str) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        for result in self.rows.scan_prefix(key::entity_prefix(entity)) {
            let (key_bytes, value) = result?;
            rows.push(Self::decode_row(&key_bytes, &value)?);
        }
        Ok(rows)
    }

    fn allocate_id(&self, _entity: &str) -> Result<u64, Error> {
        // sled ids start at zero; primary keys start at one.
        Ok(self.db.generate_id()? + 1)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), Error> {
        let result: Result<(), TransactionError<Error>> =
            (&self.rows, &self.references).transaction(|(rows, references)| {
                for op in batch.operations() {
                    match op {
                        WriteOp::Put(row) => Self::execute_put(rows, references, row)?,
                        WriteOp::Delete(row_key) => {
                            Self::execute_delete(rows, references, row_key)?
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(Error::Storage(e)),
        }
        if self.flush_on_commit {
            self.db.flush()?;
        }
        Ok(())
    }

    fn scan_referencing(
        &self,
        entity: &str,
        foreign_key: &str,
        parent_id: u64,
    ) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        for result in self
            .references
            .scan_prefix(key::reference_prefix(entity, foreign_key, parent_id))
        {
            let (index_key, _) = result?;
            let id = key::reference_child(&index_key).ok_or(Error::InvalidKey)?;
            if let Some(row) = self.get(&RowKey::new(entity, id))? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}
