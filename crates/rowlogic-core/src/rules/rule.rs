//! Rule definitions.
//!
//! Predicates and expressions are pure functions over a [`Row`]; they see
//! only the row they are given and capture no mutable state.

use std::fmt;
use std::sync::Arc;

use crate::storage::Row;
use crate::value::{EvaluationError, Value};

/// Boolean function over a row.
pub type Predicate = Arc<dyn Fn(&Row) -> Result<bool, EvaluationError> + Send + Sync>;

/// Value-producing function over a row.
pub type Expression = Arc<dyn Fn(&Row) -> Result<Value, EvaluationError> + Send + Sync>;

/// An (entity type, attribute) pair; a node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrRef {
    /// Entity type name.
    pub entity: String,
    /// Attribute name.
    pub attribute: String,
}

impl AttrRef {
    /// Create an attribute reference.
    pub fn new(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.attribute)
    }
}

/// Invariant that must hold on every row it governs after a propagation pass.
#[derive(Clone)]
pub struct ConstraintRule {
    /// Entity type validated.
    pub entity: String,
    /// Constraint name, unique per entity.
    pub name: String,
    /// Must evaluate to true.
    pub predicate: Predicate,
    /// Message template; `{attribute}` placeholders are filled from the row.
    pub message: String,
}

/// Filter restricting which child rows a sum includes.
#[derive(Clone)]
pub struct SumFilter {
    /// Child attributes the predicate reads.
    pub inputs: Vec<String>,
    /// Inclusion test, re-evaluated on every recomputation.
    pub predicate: Predicate,
}

/// `target = sum(child.source)` over the children of a relation.
#[derive(Clone)]
pub struct SumRule {
    /// Derived attribute on the parent.
    pub target: AttrRef,
    /// Relation from the target's entity to the summed children.
    pub relation: String,
    /// Summed attribute on the child.
    pub source: String,
    /// Optional child filter.
    pub filter: Option<SumFilter>,
}

/// `target = expression(row)` over attributes of the same row.
#[derive(Clone)]
pub struct FormulaRule {
    /// Derived attribute.
    pub target: AttrRef,
    /// Attributes of the same row the expression reads.
    pub inputs: Vec<String>,
    /// The expression.
    pub expression: Expression,
}

/// `target = parent.source`, following a relation from child to parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRule {
    /// Derived attribute on the child.
    pub target: AttrRef,
    /// Relation from the parent to the target's entity.
    pub relation: String,
    /// Copied attribute on the parent.
    pub source: String,
}

/// A declarative rule.
#[derive(Clone)]
pub enum Rule {
    /// Row invariant.
    Constraint(ConstraintRule),
    /// Parent aggregate over children.
    Sum(SumRule),
    /// Same-row expression.
    Formula(FormulaRule),
    /// Value inherited from the parent.
    Copy(CopyRule),
}

impl Rule {
    /// Declare a constraint on `entity`.
    pub fn constraint<F>(
        entity: impl Into<String>,
        name: impl Into<String>,
        predicate: F,
        message: impl Into<String>,
    ) -> ConstraintRule
    where
        F: Fn(&Row) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        ConstraintRule {
            entity: entity.into(),
            name: name.into(),
            predicate: Arc::new(predicate),
            message: message.into(),
        }
    }

    /// Declare `entity.target` as the sum of `source` over the children
    /// reached through `relation`.
    pub fn sum(
        entity: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
        source: impl Into<String>,
    ) -> SumRule {
        SumRule {
            target: AttrRef::new(entity, target),
            relation: relation.into(),
            source: source.into(),
            filter: None,
        }
    }

    /// Declare `entity.target` as an expression over `inputs` of the same row.
    pub fn formula<F, I, S>(
        entity: impl Into<String>,
        target: impl Into<String>,
        inputs: I,
        expression: F,
    ) -> FormulaRule
    where
        F: Fn(&Row) -> Result<Value, EvaluationError> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FormulaRule {
            target: AttrRef::new(entity, target),
            inputs: inputs.into_iter().map(Into::into).collect(),
            expression: Arc::new(expression),
        }
    }

    /// Declare `entity.target` as a copy of the parent's `source` through
    /// `relation`.
    pub fn copy(
        entity: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
        source: impl Into<String>,
    ) -> CopyRule {
        CopyRule {
            target: AttrRef::new(entity, target),
            relation: relation.into(),
            source: source.into(),
        }
    }

    /// The derived attribute, or `None` for constraints.
    pub fn target(&self) -> Option<&AttrRef> {
        match self {
            Rule::Constraint(_) => None,
            Rule::Sum(rule) => Some(&rule.target),
            Rule::Formula(rule) => Some(&rule.target),
            Rule::Copy(rule) => Some(&rule.target),
        }
    }

    /// Entity type the rule is attached to.
    pub fn entity(&self) -> &str {
        match self {
            Rule::Constraint(rule) => &rule.entity,
            Rule::Sum(rule) => &rule.target.entity,
            Rule::Formula(rule) => &rule.target.entity,
            Rule::Copy(rule) => &rule.target.entity,
        }
    }

    /// Rule kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Constraint(_) => "constraint",
            Rule::Sum(_) => "sum",
            Rule::Formula(_) => "formula",
            Rule::Copy(_) => "copy",
        }
    }
}

impl SumRule {
    /// Only include children for which `predicate` holds; `inputs` names
    /// the child attributes it reads.
    pub fn filtered<F, I, S>(mut self, inputs: I, predicate: F) -> Self
    where
        F: Fn(&Row) -> Result<bool, EvaluationError> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(SumFilter {
            inputs: inputs.into_iter().map(Into::into).collect(),
            predicate: Arc::new(predicate),
        });
        self
    }
}

impl From<ConstraintRule> for Rule {
    fn from(rule: ConstraintRule) -> Self {
        Rule::Constraint(rule)
    }
}

impl From<SumRule> for Rule {
    fn from(rule: SumRule) -> Self {
        Rule::Sum(rule)
    }
}

impl From<FormulaRule> for Rule {
    fn from(rule: FormulaRule) -> Self {
        Rule::Formula(rule)
    }
}

impl From<CopyRule> for Rule {
    fn from(rule: CopyRule) -> Self {
        Rule::Copy(rule)
    }
}

impl fmt::Debug for ConstraintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintRule")
            .field("entity", &self.entity)
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for SumFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumFilter")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for SumRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumRule")
            .field("target", &self.target)
            .field("relation", &self.relation)
            .field("source", &self.source)
            .field("filter", &self.filter)
            .finish()
    }
}

impl fmt::Debug for FormulaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaRule")
            .field("target", &self.target)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Constraint(rule) => fmt::Debug::fmt(rule, f),
            Rule::Sum(rule) => fmt::Debug::fmt(rule, f),
            Rule::Formula(rule) => fmt::Debug::fmt(rule, f),
            Rule::Copy(rule) => fmt::Debug::fmt(rule, f),
        }
    }
}
