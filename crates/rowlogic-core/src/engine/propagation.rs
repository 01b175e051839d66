//! The propagation pass.
//!
//! Work items are (row, derived attribute) pairs processed in ascending
//! topological rank, ties broken by arrival order. Since every dependency
//! edge points to a strictly higher rank, an item is never needed again
//! once processed, so each pair is computed at most once per pass.
//!
//! Constraints run when a row has stabilized: nothing is pending on it and
//! every queued item ranks above the highest derived attribute of its
//! entity type. Nothing queued later can reach the row after that point.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use indexmap::IndexSet;
use rust_decimal::Decimal;
use tracing::debug;

use super::{LogicEngine, PropagationResult};
use crate::changelog::ChangeKind;
use crate::error::{Error, PropagationError};
use crate::rules::{AttrRef, CopyRule, Rule, SumRule, Traversal};
use crate::storage::{Row, RowKey};
use crate::transaction::Transaction;
use crate::value::{EvaluationError, Value};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct WorkItem {
    rank: usize,
    seq: u64,
    key: RowKey,
    attribute: String,
}

/// Executes one propagation pass over a transaction's overlay.
pub(crate) struct Propagator<'t, 'a> {
    engine: &'a LogicEngine,
    tx: &'t mut Transaction<'a>,
    queue: BinaryHeap<Reverse<WorkItem>>,
    queued: HashSet<(RowKey, String)>,
    pending: HashMap<RowKey, usize>,
    settling: IndexSet<RowKey>,
    seen: HashSet<RowKey>,
    settled_through: Option<usize>,
    seq: u64,
    result: PropagationResult,
}

impl<'t, 'a> Propagator<'t, 'a> {
    pub(crate) fn new(tx: &'t mut Transaction<'a>) -> Self {
        Self {
            engine: tx.engine(),
            tx,
            queue: BinaryHeap::new(),
            queued: HashSet::new(),
            pending: HashMap::new(),
            settling: IndexSet::new(),
            seen: HashSet::new(),
            settled_through: None,
            seq: 0,
            result: PropagationResult::default(),
        }
    }

    /// Seed from the change log, drain the queue, and check constraints.
    pub(crate) fn run(mut self) -> Result<PropagationResult, Error> {
        self.seed()?;

        loop {
            let next_rank = self.queue.peek().map(|Reverse(item)| item.rank);
            if next_rank.is_none() || next_rank != self.settled_through {
                self.settle(next_rank)?;
                self.settled_through = next_rank;
            }
            let Some(Reverse(item)) = self.queue.pop() else {
                break;
            };
            self.recompute(&item)?;
            if let Some(count) = self.pending.get_mut(&item.key) {
                *count = count.saturating_sub(1);
            }
        }

        Ok(self.result)
    }

    fn seed(&mut self) -> Result<(), Error> {
        let engine = self.engine;
        let registry = engine.rules().registry();
        let records: Vec<_> = self.tx.change_log().records().cloned().collect();

        for record in records {
            match record.kind {
                ChangeKind::Insert => {
                    let Some(row) = self.tx.get(&record.key)? else {
                        continue;
                    };
                    self.mark(&record.key);
                    for attribute in &record.changed {
                        self.enqueue_dependents(&row, attribute, None, true)?;
                    }
                    for attribute in registry.derived_attributes(&record.key.entity) {
                        self.enqueue(&record.key, attribute)?;
                    }
                }
                ChangeKind::Update => {
                    let Some(row) = self.tx.get(&record.key)? else {
                        continue;
                    };
                    self.mark(&record.key);
                    for attribute in &record.changed {
                        let old = record.old_values.get(attribute);
                        self.enqueue_dependents(&row, attribute, old, true)?;
                        if registry.is_derived(&record.key.entity, attribute) {
                            self.enqueue(&record.key, attribute)?;
                        }
                    }
                }
                ChangeKind::Delete => {
                    let old = Row {
                        key: record.key.clone(),
                        values: record.old_values.clone(),
                    };
                    if self.seen.insert(record.key.clone()) {
                        self.result.touch(&record.key.entity);
                    }
                    for attribute in &record.changed {
                        self.enqueue_dependents(&old, attribute, None, false)?;
                    }
                }
            }
        }

        let rederive: Vec<RowKey> = self.tx.rederive_keys().cloned().collect();
        for key in rederive {
            if self.tx.get(&key)?.is_none() {
                continue;
            }
            self.mark(&key);
            for attribute in registry.derived_attributes(&key.entity) {
                self.enqueue(&key, attribute)?;
            }
        }

        debug!(
            records = self.tx.change_log().len(),
            queued = self.queue.len(),
            "seeded propagation"
        );
        Ok(())
    }

    /// Record a live row as touched and awaiting its constraint check.
    fn mark(&mut self, key: &RowKey) {
        if self.seen.insert(key.clone()) {
            self.result.touch(&key.entity);
        }
        self.settling.insert(key.clone());
    }

    fn enqueue(&mut self, key: &RowKey, attribute: &str) -> Result<(), Error> {
        if !self.queued.insert((key.clone(), attribute.to_string())) {
            return Ok(());
        }
        if self.tx.get(key)?.is_none() {
            return Ok(());
        }

        let rank = self
            .engine
            .rules()
            .graph()
            .rank(&AttrRef::new(&key.entity, attribute));
        self.seq += 1;
        debug!(row = %key, attribute, rank, "enqueue");
        self.queue.push(Reverse(WorkItem {
            rank,
            seq: self.seq,
            key: key.clone(),
            attribute: attribute.to_string(),
        }));
        *self.pending.entry(key.clone()).or_insert(0) += 1;
        self.mark(key);
        Ok(())
    }

    /// Queue every derivation that reads `attribute` of `row`.
    ///
    /// `old` is the value before this transaction; a foreign key change uses
    /// it to reach the former parent. Same-row and child edges are skipped
    /// when the row itself is gone.
    fn enqueue_dependents(
        &mut self,
        row: &Row,
        attribute: &str,
        old: Option<&Value>,
        live: bool,
    ) -> Result<(), Error> {
        let engine = self.engine;
        let catalog = engine.catalog();
        let node = AttrRef::new(row.entity(), attribute);

        for edge in engine.rules().graph().dependents(&node) {
            match &edge.traversal {
                Traversal::SameRow => {
                    if live {
                        self.enqueue(&row.key, &edge.target.attribute)?;
                    }
                }
                Traversal::ToParent(name) => {
                    let Some(relation) = catalog.get_relation(name) else {
                        continue;
                    };
                    let current = row.reference(&relation.foreign_key);
                    if let Some(parent_id) = current {
                        let parent = RowKey::new(&relation.parent, parent_id);
                        self.enqueue(&parent, &edge.target.attribute)?;
                    }
                    if attribute == relation.foreign_key {
                        let former = old.and_then(Value::as_ref_id);
                        if let Some(parent_id) = former.filter(|id| Some(*id) != current) {
                            let parent = RowKey::new(&relation.parent, parent_id);
                            self.enqueue(&parent, &edge.target.attribute)?;
                        }
                    }
                }
                Traversal::ToChildren(name) => {
                    if !live {
                        continue;
                    }
                    for child in self.tx.children(name, row.id())? {
                        self.enqueue(&child.key, &edge.target.attribute)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn recompute(&mut self, item: &WorkItem) -> Result<(), Error> {
        let engine = self.engine;
        let Some(mut row) = self.tx.get(&item.key)? else {
            return Ok(());
        };
        let Some(rule) = engine.rules().registry().rule_for(&item.key.entity, &item.attribute)
        else {
            return Ok(());
        };

        let derived = match rule {
            Rule::Sum(sum) => Some(self.evaluate_sum(&row, sum)?),
            Rule::Formula(formula) => Some((formula.expression)(&row)),
            Rule::Copy(copy) => self.evaluate_copy(&row, copy)?,
            Rule::Constraint(_) => None,
        };
        let Some(derived) = derived else {
            return Ok(());
        };
        self.result.recomputed += 1;

        let value = derived
            .and_then(|value| self.normalize(&item.key.entity, &item.attribute, value, rule))
            .map_err(|source| PropagationError::Derivation {
                row: item.key.clone(),
                attribute: item.attribute.clone(),
                source,
            })?;

        if row.value(&item.attribute) == &value {
            debug!(row = %item.key, attribute = %item.attribute, "unchanged");
            return Ok(());
        }

        debug!(row = %item.key, attribute = %item.attribute, %value, "recomputed");
        row.set(item.attribute.clone(), value);
        self.tx.put_derived(row.clone());
        self.result.changed += 1;
        self.enqueue_dependents(&row, &item.attribute, None, true)
    }

    /// Rescan the live children; the filter is evaluated on every child.
    fn evaluate_sum(
        &self,
        row: &Row,
        rule: &SumRule,
    ) -> Result<Result<Value, EvaluationError>, Error> {
        let children = self.tx.children(&rule.relation, row.id())?;
        let mut total = Decimal::ZERO;

        for child in &children {
            if let Some(filter) = &rule.filter {
                match (filter.predicate)(child) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => return Ok(Err(err)),
                }
            }
            let amount = match child.decimal_or_zero(&rule.source) {
                Ok(amount) => amount,
                Err(err) => return Ok(Err(err)),
            };
            total = match total.checked_add(amount) {
                Some(total) => total,
                None => return Ok(Err(EvaluationError::Overflow)),
            };
        }
        Ok(Ok(Value::Decimal(total)))
    }

    /// `None` when the foreign key is null: the current value stands.
    fn evaluate_copy(
        &self,
        row: &Row,
        rule: &CopyRule,
    ) -> Result<Option<Result<Value, EvaluationError>>, Error> {
        let Some(relation) = self.engine.catalog().get_relation(&rule.relation) else {
            return Ok(None);
        };
        let Some(parent_id) = row.reference(&relation.foreign_key) else {
            return Ok(None);
        };

        let parent = self.tx.get(&RowKey::new(&relation.parent, parent_id))?;
        Ok(Some(match parent {
            Some(parent) => Ok(parent.value(&rule.source).clone()),
            None => Err(EvaluationError::DanglingReference {
                relation: relation.name.clone(),
                entity: relation.parent.clone(),
                id: parent_id,
            }),
        }))
    }

    /// Coerce to the target's type; decimal sums and formulas are fixed to
    /// the configured scale.
    fn normalize(
        &self,
        entity: &str,
        attribute: &str,
        value: Value,
        rule: &Rule,
    ) -> Result<Value, EvaluationError> {
        let field = self
            .engine
            .catalog()
            .get_field(entity, attribute)
            .ok_or_else(|| EvaluationError::UnknownField(attribute.to_string()))?;
        let scale = self.engine.config().decimal_scale;
        let value = field.field_type.coerce(value)?;
        Ok(match (value, rule) {
            (Value::Decimal(d), Rule::Sum(_) | Rule::Formula(_)) => {
                let mut d = d.round_dp(scale);
                d.rescale(scale);
                // rescale lowers the scale instead of failing when the
                // mantissa has no room.
                if d.scale() != scale {
                    return Err(EvaluationError::Overflow);
                }
                Value::Decimal(d)
            }
            (value, _) => value,
        })
    }

    /// Check constraints on every row that can no longer change.
    ///
    /// `next_rank` is the lowest queued rank, `None` once the queue is empty.
    fn settle(&mut self, next_rank: Option<usize>) -> Result<(), Error> {
        let graph = self.engine.rules().graph();
        let ready: Vec<RowKey> = self
            .settling
            .iter()
            .filter(|key| self.pending.get(*key).copied().unwrap_or(0) == 0)
            .filter(|key| match (next_rank, graph.horizon(&key.entity)) {
                (Some(next), Some(horizon)) => horizon < next,
                _ => true,
            })
            .cloned()
            .collect();

        for key in ready {
            self.settling.shift_remove(&key);
            self.check_constraints(&key)?;
        }
        Ok(())
    }

    fn check_constraints(&mut self, key: &RowKey) -> Result<(), Error> {
        let engine = self.engine;
        let constraints = engine.rules().registry().constraints_for(&key.entity);
        if constraints.is_empty() {
            return Ok(());
        }
        let Some(row) = self.tx.get(key)? else {
            return Ok(());
        };

        for constraint in constraints {
            self.result.constraints_checked += 1;
            match (constraint.predicate)(&row) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(PropagationError::ConstraintViolation {
                        row: key.clone(),
                        constraint: constraint.name.clone(),
                        message: row.render(&constraint.message),
                    }
                    .into());
                }
                Err(source) => {
                    return Err(PropagationError::Derivation {
                        row: key.clone(),
                        attribute: constraint.name.clone(),
                        source,
                    }
                    .into());
                }
            }
        }
        debug!(row = %key, checked = constraints.len(), "constraints hold");
        Ok(())
    }
}
