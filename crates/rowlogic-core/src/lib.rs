//! rowlogic core - declarative derivation rules over a relational row store.
//!
//! Rules (constraints, sums, formulas, copies) are declared once against a
//! [`Catalog`]. Every committed [`Transaction`] runs a propagation pass that
//! recomputes dependent attributes in topological order and validates
//! constraints before anything reaches the [`RowStore`].

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod changelog;
pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod rules;
pub mod storage;
pub mod transaction;
pub mod value;

pub use catalog::{
    Catalog, DefaultValue, DeleteBehavior, EntityDef, FieldDef, FieldType, RelationDef,
};
pub use changelog::{ChangeKind, ChangeLog, ChangeRecord};
pub use config::EngineConfig;
pub use engine::{LogicEngine, PropagationResult};
pub use error::{CatalogError, Error, PropagationError, RuleError};
pub use rules::{AttrRef, DependencyGraph, Rule, RuleRegistry, RuleSet, Traversal};
pub use storage::{MemoryStore, Row, RowKey, RowStore, SledStore, StorageConfig, WriteBatch};
pub use transaction::Transaction;
pub use value::{EvaluationError, Value};

/// Re-export of the decimal type used for all derived arithmetic.
pub use rust_decimal::Decimal;
