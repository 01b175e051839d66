//! Transaction coordinator.
//!
//! A [`Transaction`] buffers direct edits in a write overlay and records
//! them in a [`ChangeLog`]. Reads see the overlay first, then the store.
//! [`Transaction::commit`] runs the propagation pass over the overlay and
//! hands the result to the store as one atomic batch; any failure drops
//! the overlay, so nothing from the transaction becomes visible.

use std::collections::{BTreeMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use crate::catalog::{DeleteBehavior, FieldDef, RelationDef, PRIMARY_KEY};
use crate::changelog::ChangeLog;
use crate::engine::{LogicEngine, PropagationResult, Propagator};
use crate::error::{Error, Result, RuleError};
use crate::storage::{Row, RowKey, WriteBatch};
use crate::value::{EvaluationError, Value};

/// A unit of work against a [`LogicEngine`].
///
/// Dropping a transaction without committing discards it.
pub struct Transaction<'a> {
    engine: &'a LogicEngine,
    /// Pending writes; `None` marks a delete.
    writes: IndexMap<RowKey, Option<Row>>,
    log: ChangeLog,
    rederive: IndexSet<RowKey>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(engine: &'a LogicEngine) -> Self {
        Self {
            engine,
            writes: IndexMap::new(),
            log: ChangeLog::new(),
            rederive: IndexSet::new(),
        }
    }

    pub(crate) fn engine(&self) -> &'a LogicEngine {
        self.engine
    }

    /// Insert a row, returning its key.
    ///
    /// Values are coerced to the declared field types. Omitted fields take
    /// their default; a required field with no default must be given unless
    /// a rule derives it.
    pub fn insert<K, V>(
        &mut self,
        entity: &str,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Result<RowKey>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let engine = self.engine;
        let entity_def = engine
            .catalog()
            .get_entity(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;

        let mut given = BTreeMap::new();
        for (attribute, value) in values {
            let (attribute, value) = self.prepare(entity, attribute.into(), value.into())?;
            given.insert(attribute, value);
        }

        let registry = engine.rules().registry();
        let mut values = BTreeMap::new();
        for field in &entity_def.fields {
            let value = match given.remove(&field.name) {
                Some(value) => value,
                None => match &field.default {
                    Some(default) => default.resolve(),
                    None => Value::Null,
                },
            };
            if value.is_null() && field.required && !registry.is_derived(entity, &field.name) {
                return Err(Error::MissingAttribute {
                    entity: entity.to_string(),
                    attribute: field.name.clone(),
                });
            }
            values.insert(field.name.clone(), value);
        }

        let key = RowKey::new(entity, engine.store().allocate_id(entity)?);
        let row = Row {
            key: key.clone(),
            values,
        };
        let set: Vec<String> = row
            .values
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, _)| name.clone())
            .collect();

        debug!(row = %key, attributes = set.len(), "insert");
        self.log.record_insert(key.clone(), set);
        self.writes.insert(key.clone(), Some(row));
        Ok(key)
    }

    /// Update attributes of an existing row.
    ///
    /// Attributes whose value does not change are not recorded.
    pub fn update<K, V>(
        &mut self,
        key: &RowKey,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Result<()>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = self.require(key)?;
        let mut changes = Vec::new();

        for (attribute, value) in values {
            let (attribute, value) = self.prepare(&key.entity, attribute.into(), value.into())?;
            if row.value(&attribute) == &value {
                continue;
            }
            let old = row.set(attribute.clone(), value).unwrap_or_default();
            changes.push((attribute, old));
        }

        if changes.is_empty() {
            return Ok(());
        }
        debug!(row = %key, attributes = changes.len(), "update");
        self.log.record_update(key.clone(), changes);
        self.writes.insert(key.clone(), Some(row));
        Ok(())
    }

    /// Delete a row, applying each child relation's delete behavior.
    ///
    /// A failed delete leaves the transaction as it was before the call.
    pub fn delete(&mut self, key: &RowKey) -> Result<()> {
        let writes = self.writes.clone();
        let log = self.log.clone();

        let mut visited = HashSet::new();
        if let Err(err) = self.delete_recursive(key, &mut visited, 0) {
            self.writes = writes;
            self.log = log;
            return Err(err);
        }
        Ok(())
    }

    fn delete_recursive(
        &mut self,
        key: &RowKey,
        visited: &mut HashSet<RowKey>,
        depth: usize,
    ) -> Result<()> {
        let engine = self.engine;
        if depth > engine.config().max_cascade_depth {
            return Err(Error::CascadeDepthExceeded { depth });
        }
        if !visited.insert(key.clone()) {
            return Ok(());
        }

        let row = self.require(key)?;

        for relation in engine.catalog().child_relations(&key.entity) {
            let children = self.children(&relation.name, key.id)?;
            if children.is_empty() {
                continue;
            }

            match relation.on_delete {
                DeleteBehavior::Restrict => {
                    return Err(Error::RestrictViolation {
                        relation: relation.name.clone(),
                        entity: key.clone(),
                        referencing_entity: relation.child.clone(),
                        count: children.len(),
                    });
                }
                DeleteBehavior::Cascade => {
                    for child in children {
                        self.delete_recursive(&child.key, visited, depth + 1)?;
                    }
                }
                DeleteBehavior::SetNull => {
                    for child in children {
                        self.update(&child.key, [(relation.foreign_key.as_str(), Value::Null)])?;
                    }
                }
            }
        }

        debug!(row = %key, depth, "delete");
        self.rederive.shift_remove(key);
        self.log.record_delete(key.clone(), row.values);
        self.writes.insert(key.clone(), None);
        Ok(())
    }

    /// Read a row as this transaction sees it.
    pub fn get(&self, key: &RowKey) -> Result<Option<Row>> {
        match self.writes.get(key) {
            Some(slot) => Ok(slot.clone()),
            None => self.engine.store().get(key),
        }
    }

    /// Read a row that must exist.
    pub fn require(&self, key: &RowKey) -> Result<Row> {
        self.get(key)?.ok_or_else(|| Error::NotFound(key.clone()))
    }

    /// Live children of a parent through a relation, in key order.
    ///
    /// Committed children are merged with this transaction's overlay.
    pub fn children(&self, relation: &str, parent_id: u64) -> Result<Vec<Row>> {
        let relation = self.relation(relation)?;
        let mut rows: BTreeMap<RowKey, Row> = self
            .engine
            .store()
            .scan_referencing(&relation.child, &relation.foreign_key, parent_id)?
            .into_iter()
            .filter(|row| !self.writes.contains_key(&row.key))
            .map(|row| (row.key.clone(), row))
            .collect();

        for (key, slot) in &self.writes {
            if key.entity != relation.child {
                continue;
            }
            if let Some(row) = slot {
                if row.reference(&relation.foreign_key) == Some(parent_id) {
                    rows.insert(key.clone(), row.clone());
                }
            }
        }
        Ok(rows.into_values().collect())
    }

    /// Live children that satisfy `filter`, applied after the fetch.
    pub fn children_where<F>(&self, relation: &str, parent_id: u64, filter: F) -> Result<Vec<Row>>
    where
        F: Fn(&Row) -> bool,
    {
        let mut rows = self.children(relation, parent_id)?;
        rows.retain(|row| filter(row));
        Ok(rows)
    }

    /// Schedule every derived attribute of a row for recomputation.
    pub fn rederive(&mut self, key: &RowKey) -> Result<()> {
        self.require(key)?;
        self.rederive.insert(key.clone());
        Ok(())
    }

    /// Direct edits recorded so far.
    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    /// Whether the transaction holds no edits.
    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.rederive.is_empty()
    }

    /// Run propagation and apply the result atomically.
    ///
    /// # Errors
    ///
    /// [`Error::Propagation`] if a constraint fails or a derivation cannot
    /// be evaluated; the transaction is rolled back in full.
    pub fn commit(mut self) -> Result<PropagationResult> {
        let engine = self.engine;
        let edits = self.log.len();

        let result = match Propagator::new(&mut self).run() {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, edits, "transaction rejected, rolling back");
                return Err(err);
            }
        };

        let batch = self.into_batch();
        let writes = batch.len();
        if !batch.is_empty() {
            engine.store().apply(batch)?;
        }

        info!(
            edits,
            writes,
            rows_touched = result.rows_touched(),
            recomputed = result.recomputed,
            changed = result.changed,
            constraints_checked = result.constraints_checked,
            "transaction committed"
        );
        Ok(result)
    }

    /// Discard every edit.
    pub fn rollback(self) {
        debug!(edits = self.log.len(), "transaction rolled back");
    }

    pub(crate) fn put_derived(&mut self, row: Row) {
        self.writes.insert(row.key.clone(), Some(row));
    }

    pub(crate) fn rederive_keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rederive.iter()
    }

    fn into_batch(self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (key, slot) in self.writes {
            match slot {
                Some(row) => batch.put(row),
                None => batch.delete(key),
            };
        }
        batch
    }

    fn relation(&self, name: &str) -> Result<&'a RelationDef> {
        self.engine.catalog().get_relation(name).ok_or_else(|| {
            Error::Rule(RuleError::InvalidRelationship {
                relation: name.to_string(),
                reason: "no such relation".into(),
            })
        })
    }

    fn field(&self, entity: &str, attribute: &str) -> Result<&'a FieldDef> {
        self.engine
            .catalog()
            .get_field(entity, attribute)
            .ok_or_else(|| Error::UnknownAttribute {
                entity: entity.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Validate a direct edit: known field, coercible value, live parent.
    fn prepare(&self, entity: &str, attribute: String, value: Value) -> Result<(String, Value)> {
        if attribute == PRIMARY_KEY {
            return Err(Error::UnknownAttribute {
                entity: entity.to_string(),
                attribute,
            });
        }
        let field = self.field(entity, &attribute)?;
        let invalid = |source: EvaluationError| Error::InvalidValue {
            entity: entity.to_string(),
            attribute: attribute.clone(),
            source,
        };
        let value = field.field_type.coerce(value).map_err(&invalid)?;

        if let (Some(parent), Some(id)) = (field.referenced_entity(), value.as_ref_id()) {
            if self.get(&RowKey::new(parent, id))?.is_none() {
                let relation = self
                    .engine
                    .catalog()
                    .parent_relations(entity)
                    .find(|relation| relation.foreign_key == attribute)
                    .map(|relation| relation.name.clone())
                    .unwrap_or_default();
                return Err(invalid(EvaluationError::DanglingReference {
                    relation,
                    entity: parent.to_string(),
                    id,
                }));
            }
        }
        Ok((attribute, value))
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("writes", &self.writes.len())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
