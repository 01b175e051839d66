//! Core error types.

use thiserror::Error;

use crate::rules::AttrRef;
use crate::storage::RowKey;
use crate::value::EvaluationError;

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Row (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catalog definition error.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Rule registration or graph build error.
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// The propagation pass rejected the transaction.
    #[error("transaction rejected: {0}")]
    Propagation(#[from] PropagationError),

    /// Row not found.
    #[error("row not found: {0}")]
    NotFound(RowKey),

    /// Entity type not present in the catalog.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Attribute not present on the entity type.
    #[error("unknown attribute: {entity}.{attribute}")]
    UnknownAttribute {
        /// Entity type name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },

    /// Required attribute missing on insert.
    #[error("missing required attribute: {entity}.{attribute}")]
    MissingAttribute {
        /// Entity type name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },

    /// Value does not fit the attribute's semantic type.
    #[error("invalid value for {entity}.{attribute}: {source}")]
    InvalidValue {
        /// Entity type name.
        entity: String,
        /// Attribute name.
        attribute: String,
        /// Underlying conversion failure.
        #[source]
        source: EvaluationError,
    },

    /// Delete blocked by a restricting relation.
    #[error("cannot delete {entity}: {count} {referencing_entity} row(s) reference it via '{relation}'")]
    RestrictViolation {
        /// Relation name.
        relation: String,
        /// Row being deleted.
        entity: RowKey,
        /// Child entity type holding the references.
        referencing_entity: String,
        /// Number of referencing rows.
        count: usize,
    },

    /// Cascading delete went deeper than the allowed limit.
    #[error("cascade depth {depth} exceeded")]
    CascadeDepthExceeded {
        /// Depth at which the cascade stopped.
        depth: usize,
    },

    /// Invalid key format in storage.
    #[error("invalid key format")]
    InvalidKey,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Catalog validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Two entity types share a name.
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    /// Two relations share a name.
    #[error("duplicate relation: {0}")]
    DuplicateRelation(String),

    /// A relation or reference names an entity that does not exist.
    #[error("relation '{relation}' references unknown entity '{entity}'")]
    UnknownEntity {
        /// Relation name.
        relation: String,
        /// Missing entity name.
        entity: String,
    },

    /// The relation's foreign key is missing or is not a reference to the parent.
    #[error("relation '{relation}': {entity}.{field} is not a reference to {parent}")]
    ForeignKeyMismatch {
        /// Relation name.
        relation: String,
        /// Child entity name.
        entity: String,
        /// Foreign key field.
        field: String,
        /// Expected parent entity.
        parent: String,
    },

    /// A foreign key is bound to more than one relation.
    #[error("{entity}.{field} is the foreign key of more than one relation")]
    DuplicateForeignKey {
        /// Child entity name.
        entity: String,
        /// Foreign key field.
        field: String,
    },

    /// A reference field is not bound to any relation.
    #[error("{entity}.{field} references {parent} but no relation declares it")]
    UnboundReference {
        /// Entity name.
        entity: String,
        /// Reference field.
        field: String,
        /// Referenced entity.
        parent: String,
    },

    /// The attribute name is reserved for the primary key.
    #[error("{entity}.{field}: attribute name is reserved")]
    ReservedAttribute {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },
}

/// Rule registration and dependency graph errors.
///
/// All of these are fatal at startup: an engine is never built from a rule
/// set that produced one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The target attribute already has a derivation rule.
    #[error("{target} is already derived by a {existing} rule")]
    DuplicateTarget {
        /// Contested target.
        target: AttrRef,
        /// Kind of the rule already registered.
        existing: &'static str,
    },

    /// A sum or copy names a relation that does not join its entities.
    #[error("invalid relationship '{relation}': {reason}")]
    InvalidRelationship {
        /// Relation name.
        relation: String,
        /// Why the relation does not fit.
        reason: String,
    },

    /// The derivation rules form a cycle.
    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// Nodes along the cycle, first node repeated at the end.
        cycle: Vec<AttrRef>,
    },

    /// Unknown entity or attribute in a rule declaration.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(AttrRef),

    /// Target attribute may not be derived.
    #[error("{target} cannot be derived: {reason}")]
    InvalidTarget {
        /// Rejected target.
        target: AttrRef,
        /// Reason for rejection.
        reason: String,
    },

    /// Two constraints on the same entity share a name.
    #[error("duplicate constraint '{name}' on {entity}")]
    DuplicateConstraint {
        /// Entity name.
        entity: String,
        /// Constraint name.
        name: String,
    },
}

fn format_cycle(cycle: &[AttrRef]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Per-transaction rule failures raised by the propagation pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropagationError {
    /// A constraint evaluated to false on a stabilized row.
    #[error("constraint '{constraint}' failed on {row}: {message}")]
    ConstraintViolation {
        /// Row that failed the constraint.
        row: RowKey,
        /// Constraint name.
        constraint: String,
        /// Formatted error message.
        message: String,
    },

    /// A derivation (or a constraint predicate) could not be evaluated.
    #[error("cannot derive {row}.{attribute}: {source}")]
    Derivation {
        /// Row being derived.
        row: RowKey,
        /// Target attribute, or constraint name.
        attribute: String,
        /// Evaluation failure.
        #[source]
        source: EvaluationError,
    },
}

impl PropagationError {
    /// The failing rule's target as (entity, attribute or constraint name).
    pub fn target(&self) -> (&str, &str) {
        match self {
            PropagationError::ConstraintViolation {
                row, constraint, ..
            } => (row.entity.as_str(), constraint.as_str()),
            PropagationError::Derivation { row, attribute, .. } => {
                (row.entity.as_str(), attribute.as_str())
            }
        }
    }

    /// The user-facing message.
    pub fn message(&self) -> String {
        match self {
            PropagationError::ConstraintViolation { message, .. } => message.clone(),
            PropagationError::Derivation { source, .. } => source.to_string(),
        }
    }
}

/// Result type alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
