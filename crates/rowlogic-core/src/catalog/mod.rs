//! Entity and relation catalog.
//!
//! The catalog describes the entity types rules are declared against and the
//! one-to-many relations sums and copies traverse.

mod catalog;
mod entity;
mod field;
mod relation;

pub use catalog::{Catalog, CatalogBuilder};
pub use entity::EntityDef;
pub use field::{DefaultValue, FieldDef, FieldType, PRIMARY_KEY};
pub use relation::{DeleteBehavior, RelationDef};
