//! Relation definitions between entities.

/// Behavior when a parent row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    /// Delete child rows as well.
    Cascade,
    /// Prevent deletion while child rows exist.
    Restrict,
    /// Set the child's foreign key to null.
    SetNull,
}

/// A one-to-many relation: each child row references at most one parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Relation name (unique within the catalog).
    pub name: String,
    /// Parent ("one" side) entity name.
    pub parent: String,
    /// Child ("many" side) entity name.
    pub child: String,
    /// Reference field on the child pointing at the parent's `id`.
    pub foreign_key: String,
    /// Delete behavior.
    pub on_delete: DeleteBehavior,
}

impl RelationDef {
    /// Create a one-to-many relation from `parent` to `child` via `foreign_key`.
    pub fn one_to_many(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            child: child.into(),
            foreign_key: foreign_key.into(),
            on_delete: DeleteBehavior::Restrict,
        }
    }

    /// Set delete behavior.
    pub fn with_on_delete(mut self, on_delete: DeleteBehavior) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Check whether this relation joins `parent` to `child`.
    pub fn joins(&self, parent: &str, child: &str) -> bool {
        self.parent == parent && self.child == child
    }
}
