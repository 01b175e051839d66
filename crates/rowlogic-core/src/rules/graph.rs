//! Attribute-level dependency graph.
//!
//! Nodes are (entity, attribute) pairs; edges run from each derivation's
//! inputs to its target. The graph is built once, when the rule set is
//! frozen, and rejects cycles before any row is processed.
//!
//! ```text
//! Product.unit_price --copy(ToChildren)--> Item.unit_price
//! Item.quantity      --formula(SameRow)--> Item.amount
//! Item.amount        --sum(ToParent)-----> Order.amount_total
//! Order.amount_total --sum(ToParent)-----> Customer.balance
//! ```

use std::collections::HashMap;

use indexmap::IndexMap;

use super::registry::RuleRegistry;
use super::rule::{AttrRef, Rule};
use crate::error::RuleError;

/// How a change at an edge's source reaches the rows holding its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Traversal {
    /// Target lives on the same row.
    SameRow,
    /// Target lives on the parent row of the named relation.
    ToParent(String),
    /// Target lives on every child row of the named relation.
    ToChildren(String),
}

/// A dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Input attribute.
    pub source: AttrRef,
    /// Derived attribute.
    pub target: AttrRef,
    /// Row traversal from source to target.
    pub traversal: Traversal,
}

/// Dependency graph with topological ranks.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Direct dependents of each node, in rule registration order.
    dependents: IndexMap<AttrRef, Vec<DependencyEdge>>,
    /// Topological rank of every node that appears in an edge.
    ranks: HashMap<AttrRef, usize>,
    /// Highest rank among each entity's derived attributes.
    horizons: HashMap<String, usize>,
    /// All nodes sorted by rank.
    order: Vec<AttrRef>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    /// Build the graph from every sum, formula, and copy in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::CyclicDependency`] naming the cycle if the rules
    /// depend on themselves, directly or transitively.
    pub fn build(registry: &RuleRegistry) -> Result<Self, RuleError> {
        let catalog = registry.catalog();
        let mut graph = DependencyGraph::default();

        for rule in registry.derivations() {
            match rule {
                Rule::Sum(sum) => {
                    let relation = catalog.get_relation(&sum.relation).ok_or_else(|| {
                        RuleError::InvalidRelationship {
                            relation: sum.relation.clone(),
                            reason: "no such relation".into(),
                        }
                    })?;
                    let to_parent = Traversal::ToParent(relation.name.clone());
                    let mut inputs = vec![sum.source.clone(), relation.foreign_key.clone()];
                    if let Some(filter) = &sum.filter {
                        inputs.extend(filter.inputs.iter().cloned());
                    }
                    for input in inputs {
                        graph.add_edge(
                            AttrRef::new(&relation.child, input),
                            sum.target.clone(),
                            to_parent.clone(),
                        );
                    }
                }
                Rule::Formula(formula) => {
                    for input in &formula.inputs {
                        graph.add_edge(
                            AttrRef::new(&formula.target.entity, input),
                            formula.target.clone(),
                            Traversal::SameRow,
                        );
                    }
                }
                Rule::Copy(copy) => {
                    let relation = catalog.get_relation(&copy.relation).ok_or_else(|| {
                        RuleError::InvalidRelationship {
                            relation: copy.relation.clone(),
                            reason: "no such relation".into(),
                        }
                    })?;
                    graph.add_edge(
                        AttrRef::new(&relation.parent, &copy.source),
                        copy.target.clone(),
                        Traversal::ToChildren(relation.name.clone()),
                    );
                    graph.add_edge(
                        AttrRef::new(&relation.child, &relation.foreign_key),
                        copy.target.clone(),
                        Traversal::SameRow,
                    );
                }
                Rule::Constraint(_) => {}
            }
        }

        let topo = graph.topological_sort()?;
        graph.assign_ranks(topo);

        for target in registry.derivations().filter_map(Rule::target) {
            let rank = graph.rank(target);
            let horizon = graph.horizons.entry(target.entity.clone()).or_insert(0);
            *horizon = (*horizon).max(rank);
        }

        tracing::debug!(
            nodes = graph.order.len(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        Ok(graph)
    }

    fn add_edge(&mut self, source: AttrRef, target: AttrRef, traversal: Traversal) {
        let edges = self.dependents.entry(source.clone()).or_default();
        let edge = DependencyEdge {
            source,
            target: target.clone(),
            traversal,
        };
        if !edges.contains(&edge) {
            edges.push(edge);
        }
        self.dependents.entry(target).or_default();
    }

    /// Depth-first topological sort; reports the first cycle found.
    fn topological_sort(&self) -> Result<Vec<AttrRef>, RuleError> {
        let mut marks: HashMap<&AttrRef, Mark> = HashMap::new();
        let mut stack: Vec<&AttrRef> = Vec::new();
        let mut postorder: Vec<AttrRef> = Vec::with_capacity(self.dependents.len());

        for node in self.dependents.keys() {
            self.visit(node, &mut marks, &mut stack, &mut postorder)?;
        }

        postorder.reverse();
        Ok(postorder)
    }

    fn visit<'a>(
        &'a self,
        node: &'a AttrRef,
        marks: &mut HashMap<&'a AttrRef, Mark>,
        stack: &mut Vec<&'a AttrRef>,
        postorder: &mut Vec<AttrRef>,
    ) -> Result<(), RuleError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<AttrRef> = stack[start..].iter().map(|n| (*n).clone()).collect();
                cycle.push(node.clone());
                return Err(RuleError::CyclicDependency { cycle });
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        stack.push(node);
        for edge in self.dependents(node) {
            self.visit(&edge.target, marks, stack, postorder)?;
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        postorder.push(node.clone());
        Ok(())
    }

    /// Longest-path layering: every edge goes from a lower to a higher rank.
    fn assign_ranks(&mut self, topo: Vec<AttrRef>) {
        let mut ranks: HashMap<AttrRef, usize> = topo.iter().map(|n| (n.clone(), 0)).collect();
        for node in &topo {
            let rank = ranks[node];
            for edge in self.dependents(node) {
                let target_rank = ranks.entry(edge.target.clone()).or_insert(0);
                *target_rank = (*target_rank).max(rank + 1);
            }
        }

        let mut order = topo;
        order.sort_by_key(|node| ranks[node]);
        self.ranks = ranks;
        self.order = order;
    }

    /// Direct dependents of a node.
    pub fn dependents(&self, node: &AttrRef) -> &[DependencyEdge] {
        self.dependents
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Topological rank of a node; nodes outside the graph rank 0.
    pub fn rank(&self, node: &AttrRef) -> usize {
        self.ranks.get(node).copied().unwrap_or(0)
    }

    /// Highest rank among an entity's derived attributes, if it has any.
    ///
    /// Once every queued recomputation ranks above this, no row of the
    /// entity can change again in the current pass.
    pub fn horizon(&self, entity: &str) -> Option<usize> {
        self.horizons.get(entity).copied()
    }

    /// All nodes, predecessors before dependents.
    pub fn topological_order(&self) -> &[AttrRef] {
        &self.order
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.dependents.values().map(Vec::len).sum()
    }
}
