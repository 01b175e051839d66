//! Declarative rules, their registry, and the dependency graph.

mod graph;
mod registry;
mod rule;

pub use graph::{DependencyEdge, DependencyGraph, Traversal};
pub use registry::RuleRegistry;
pub use rule::{
    AttrRef, ConstraintRule, CopyRule, Expression, FormulaRule, Predicate, Rule, SumFilter,
    SumRule,
};

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::RuleError;

/// A frozen, validated rule set: the registry plus the graph built from it.
#[derive(Debug)]
pub struct RuleSet {
    registry: RuleRegistry,
    graph: DependencyGraph,
}

impl RuleSet {
    /// Build the dependency graph, rejecting cyclic rule sets.
    pub fn build(registry: RuleRegistry) -> Result<Self, RuleError> {
        let graph = DependencyGraph::build(&registry)?;
        Ok(Self { registry, graph })
    }

    /// The rule registry.
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// The dependency graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The catalog rules were validated against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        self.registry.catalog()
    }
}
