//! Table rendering with comfy-table.

use comfy_table::{Cell, Table};
use rowlogic_core::{PropagationResult, Row, RuleSet, Traversal};

use crate::scenario::StepReport;

/// Rows of one entity type, one column per listed attribute.
pub fn rows_table(rows: &[Row], attributes: &[&str]) -> Table {
    let mut table = Table::new();
    let mut header = vec!["id"];
    header.extend_from_slice(attributes);
    table.set_header(header);

    for row in rows {
        let mut cells = vec![Cell::new(row.id())];
        cells.extend(attributes.iter().map(|attr| Cell::new(row.value(attr))));
        table.add_row(cells);
    }
    table
}

/// Every derivation rule with its kind and rank.
pub fn rules_table(rules: &RuleSet) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Target", "Kind", "Rank"]);

    let graph = rules.graph();
    for rule in rules.registry().derivations() {
        if let Some(target) = rule.target() {
            table.add_row(vec![
                Cell::new(target),
                Cell::new(rule.kind()),
                Cell::new(graph.rank(target)),
            ]);
        }
    }
    for entity in rules.catalog().entities() {
        for constraint in rules.registry().constraints_for(&entity.name) {
            table.add_row(vec![
                Cell::new(format!("{}: {}", entity.name, constraint.name)),
                Cell::new("constraint"),
                Cell::new("-"),
            ]);
        }
    }
    table
}

/// Dependency edges in topological order of their source.
pub fn graph_table(rules: &RuleSet) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Source", "Target", "Via"]);

    let graph = rules.graph();
    for node in graph.topological_order() {
        for edge in graph.dependents(node) {
            let via = match &edge.traversal {
                Traversal::SameRow => "same row".to_string(),
                Traversal::ToParent(relation) => format!("parent ({relation})"),
                Traversal::ToChildren(relation) => format!("children ({relation})"),
            };
            table.add_row(vec![
                Cell::new(&edge.source),
                Cell::new(&edge.target),
                Cell::new(via),
            ]);
        }
    }
    table
}

/// Statistics of one propagation pass.
pub fn result_table(result: &PropagationResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Entity", "Rows touched"]);
    for (entity, count) in &result.touched {
        table.add_row(vec![Cell::new(entity), Cell::new(count)]);
    }
    table.add_row(vec![Cell::new("recomputed"), Cell::new(result.recomputed)]);
    table.add_row(vec![Cell::new("changed"), Cell::new(result.changed)]);
    table.add_row(vec![
        Cell::new("constraint checks"),
        Cell::new(result.constraints_checked),
    ]);
    table
}

/// Walkthrough outcomes.
pub fn scenario_table(steps: &[StepReport]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Step", "Outcome", "Order total", "Balance"]);
    for step in steps {
        table.add_row(vec![
            Cell::new(&step.label),
            Cell::new(&step.outcome),
            Cell::new(step.amount_total),
            Cell::new(step.balance),
        ]);
    }
    table
}
