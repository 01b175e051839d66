//! Propagation pass statistics.

use std::collections::BTreeMap;
use std::fmt;

/// Summary of a successful propagation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationResult {
    /// Distinct rows touched, per entity type.
    pub touched: BTreeMap<String, usize>,
    /// Derivations evaluated.
    pub recomputed: usize,
    /// Derivations whose value changed.
    pub changed: usize,
    /// Constraint evaluations.
    pub constraints_checked: usize,
}

impl PropagationResult {
    /// Rows touched for one entity type.
    pub fn touched(&self, entity: &str) -> usize {
        self.touched.get(entity).copied().unwrap_or(0)
    }

    /// Total rows touched.
    pub fn rows_touched(&self) -> usize {
        self.touched.values().sum()
    }

    /// Whether the pass changed no derived value.
    pub fn is_fixed_point(&self) -> bool {
        self.changed == 0
    }

    pub(crate) fn touch(&mut self, entity: &str) {
        *self.touched.entry(entity.to_string()).or_insert(0) += 1;
    }
}

impl fmt::Display for PropagationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row(s) touched, {} recomputed, {} changed, {} constraint check(s)",
            self.rows_touched(),
            self.recomputed,
            self.changed,
            self.constraints_checked
        )
    }
}
