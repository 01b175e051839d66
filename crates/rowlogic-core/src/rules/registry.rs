//! Rule registry.
//!
//! Validates rules against the catalog as they are registered and keeps
//! them keyed by target attribute (derivations) or by entity (constraints).

use std::sync::Arc;

use indexmap::IndexMap;

use super::rule::{AttrRef, ConstraintRule, CopyRule, FormulaRule, Rule, SumRule};
use crate::catalog::{Catalog, FieldType, RelationDef, PRIMARY_KEY};
use crate::error::RuleError;

/// Registry of declared rules.
#[derive(Debug)]
pub struct RuleRegistry {
    catalog: Arc<Catalog>,
    derivations: IndexMap<AttrRef, Rule>,
    constraints: IndexMap<String, Vec<ConstraintRule>>,
}

impl RuleRegistry {
    /// Create an empty registry over a catalog.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            derivations: IndexMap::new(),
            constraints: IndexMap::new(),
        }
    }

    /// The catalog rules are validated against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Register a rule.
    ///
    /// # Errors
    ///
    /// - [`RuleError::DuplicateTarget`] if the target is already derived.
    /// - [`RuleError::InvalidRelationship`] if a sum or copy names a relation
    ///   that does not exist or does not join the entities involved.
    /// - [`RuleError::UnknownAttribute`] / [`RuleError::InvalidTarget`] for
    ///   attributes missing from the catalog or not derivable.
    pub fn register(&mut self, rule: impl Into<Rule>) -> Result<&mut Self, RuleError> {
        let rule = rule.into();
        match &rule {
            Rule::Constraint(constraint) => {
                self.check_constraint(constraint)?;
                self.constraints
                    .entry(constraint.entity.clone())
                    .or_default()
                    .push(constraint.clone());
                return Ok(self);
            }
            Rule::Sum(sum) => self.check_sum(sum)?,
            Rule::Formula(formula) => self.check_formula(formula)?,
            Rule::Copy(copy) => self.check_copy(copy)?,
        }

        let target = rule.target().cloned().ok_or_else(|| RuleError::InvalidTarget {
            target: AttrRef::new(rule.entity(), ""),
            reason: "rule has no target".into(),
        })?;
        tracing::debug!(kind = rule.kind(), %target, "registered rule");
        self.derivations.insert(target, rule);
        Ok(self)
    }

    /// The derivation rule for an attribute, if any.
    pub fn rule_for(&self, entity: &str, attribute: &str) -> Option<&Rule> {
        self.derivations.get(&AttrRef::new(entity, attribute))
    }

    /// Whether the attribute is derived by a rule.
    pub fn is_derived(&self, entity: &str, attribute: &str) -> bool {
        self.rule_for(entity, attribute).is_some()
    }

    /// Constraints for an entity, in registration order.
    pub fn constraints_for(&self, entity: &str) -> &[ConstraintRule] {
        self.constraints
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All derivation rules, in registration order.
    pub fn derivations(&self) -> impl Iterator<Item = &Rule> {
        self.derivations.values()
    }

    /// Derived attributes of one entity, in registration order.
    pub fn derived_attributes<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a str> {
        self.derivations
            .keys()
            .filter(move |target| target.entity == entity)
            .map(|target| target.attribute.as_str())
    }

    /// Number of registered rules of every kind.
    pub fn len(&self) -> usize {
        self.derivations.len() + self.constraints.values().map(Vec::len).sum::<usize>()
    }

    /// Whether no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_constraint(&self, rule: &ConstraintRule) -> Result<(), RuleError> {
        if self.catalog.get_entity(&rule.entity).is_none() {
            return Err(RuleError::UnknownAttribute(AttrRef::new(&rule.entity, "")));
        }
        if self.constraints_for(&rule.entity).iter().any(|c| c.name == rule.name) {
            return Err(RuleError::DuplicateConstraint {
                entity: rule.entity.clone(),
                name: rule.name.clone(),
            });
        }
        Ok(())
    }

    fn check_target(&self, target: &AttrRef) -> Result<(), RuleError> {
        if let Some(existing) = self.derivations.get(target) {
            return Err(RuleError::DuplicateTarget {
                target: target.clone(),
                existing: existing.kind(),
            });
        }
        if target.attribute == PRIMARY_KEY {
            return Err(RuleError::InvalidTarget {
                target: target.clone(),
                reason: "primary keys are assigned on insert".into(),
            });
        }
        let field = self
            .catalog
            .get_field(&target.entity, &target.attribute)
            .ok_or_else(|| RuleError::UnknownAttribute(target.clone()))?;
        if let FieldType::Reference { .. } = field.field_type {
            return Err(RuleError::InvalidTarget {
                target: target.clone(),
                reason: "foreign keys are set directly".into(),
            });
        }
        Ok(())
    }

    fn check_attribute(&self, entity: &str, attribute: &str) -> Result<(), RuleError> {
        if self.catalog.get_field(entity, attribute).is_none() {
            return Err(RuleError::UnknownAttribute(AttrRef::new(entity, attribute)));
        }
        Ok(())
    }

    fn relation(&self, name: &str) -> Result<&RelationDef, RuleError> {
        self.catalog
            .get_relation(name)
            .ok_or_else(|| RuleError::InvalidRelationship {
                relation: name.to_string(),
                reason: "no such relation".into(),
            })
    }

    fn check_sum(&self, rule: &SumRule) -> Result<(), RuleError> {
        self.check_target(&rule.target)?;
        let relation = self.relation(&rule.relation)?;
        if relation.parent != rule.target.entity {
            return Err(RuleError::InvalidRelationship {
                relation: relation.name.clone(),
                reason: format!(
                    "sum target {} is not the parent side ({})",
                    rule.target, relation.parent
                ),
            });
        }
        self.check_attribute(&relation.child, &rule.source)?;
        if let Some(filter) = &rule.filter {
            for input in &filter.inputs {
                self.check_attribute(&relation.child, input)?;
            }
        }
        Ok(())
    }

    fn check_formula(&self, rule: &FormulaRule) -> Result<(), RuleError> {
        self.check_target(&rule.target)?;
        for input in &rule.inputs {
            if input == PRIMARY_KEY {
                continue;
            }
            self.check_attribute(&rule.target.entity, input)?;
        }
        Ok(())
    }

    fn check_copy(&self, rule: &CopyRule) -> Result<(), RuleError> {
        self.check_target(&rule.target)?;
        let relation = self.relation(&rule.relation)?;
        if relation.child != rule.target.entity {
            return Err(RuleError::InvalidRelationship {
                relation: relation.name.clone(),
                reason: format!(
                    "copy target {} is not the child side ({})",
                    rule.target, relation.child
                ),
            });
        }
        self.check_attribute(&relation.parent, &rule.source)
    }
}
