//! Catalog of entity types and relations.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::field::PRIMARY_KEY;
use super::{EntityDef, FieldDef, RelationDef};
use crate::error::CatalogError;

/// Validated set of entity and relation definitions.
///
/// Built once at startup with [`Catalog::builder`]; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: IndexMap<String, EntityDef>,
    relations: IndexMap<String, RelationDef>,
}

/// Builder collecting definitions before validation.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entities: Vec<EntityDef>,
    relations: Vec<RelationDef>,
}

impl CatalogBuilder {
    /// Add an entity definition.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Add a relation definition.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validate and build the catalog.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::default();

        for entity in self.entities {
            if let Some(field) = entity.fields.iter().find(|f| f.name == PRIMARY_KEY) {
                return Err(CatalogError::ReservedAttribute {
                    entity: entity.name.clone(),
                    field: field.name.clone(),
                });
            }
            if catalog.entities.contains_key(&entity.name) {
                return Err(CatalogError::DuplicateEntity(entity.name));
            }
            catalog.entities.insert(entity.name.clone(), entity);
        }

        let mut bound_keys: HashSet<(String, String)> = HashSet::new();
        for relation in self.relations {
            if catalog.relations.contains_key(&relation.name) {
                return Err(CatalogError::DuplicateRelation(relation.name));
            }
            catalog.check_relation(&relation)?;
            if !bound_keys.insert((relation.child.clone(), relation.foreign_key.clone())) {
                return Err(CatalogError::DuplicateForeignKey {
                    entity: relation.child.clone(),
                    field: relation.foreign_key.clone(),
                });
            }
            catalog.relations.insert(relation.name.clone(), relation);
        }

        for entity in catalog.entities.values() {
            for field in entity.reference_fields() {
                if !bound_keys.contains(&(entity.name.clone(), field.name.clone())) {
                    return Err(CatalogError::UnboundReference {
                        entity: entity.name.clone(),
                        field: field.name.clone(),
                        parent: field.referenced_entity().unwrap_or_default().to_string(),
                    });
                }
            }
        }

        Ok(catalog)
    }
}

impl Catalog {
    /// Start building a catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Get an entity definition by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Get a field definition, if both entity and field exist.
    pub fn get_field(&self, entity: &str, field: &str) -> Option<&FieldDef> {
        self.get_entity(entity).and_then(|e| e.get_field(field))
    }

    /// Iterate entity definitions in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.values()
    }

    /// Get a relation definition by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    /// Iterate relation definitions in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.values()
    }

    /// Relations where the given entity is the parent.
    pub fn child_relations<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a RelationDef> {
        self.relations.values().filter(move |r| r.parent == parent)
    }

    /// Relations where the given entity is the child.
    pub fn parent_relations<'a>(&'a self, child: &'a str) -> impl Iterator<Item = &'a RelationDef> {
        self.relations.values().filter(move |r| r.child == child)
    }

    fn check_relation(&self, relation: &RelationDef) -> Result<(), CatalogError> {
        let unknown = |entity: &str| CatalogError::UnknownEntity {
            relation: relation.name.clone(),
            entity: entity.to_string(),
        };
        if !self.entities.contains_key(&relation.parent) {
            return Err(unknown(&relation.parent));
        }
        let child = self
            .entities
            .get(&relation.child)
            .ok_or_else(|| unknown(&relation.child))?;

        let references_parent = child
            .get_field(&relation.foreign_key)
            .and_then(FieldDef::referenced_entity)
            .is_some_and(|entity| entity == relation.parent);
        if !references_parent {
            return Err(CatalogError::ForeignKeyMismatch {
                relation: relation.name.clone(),
                entity: relation.child.clone(),
                field: relation.foreign_key.clone(),
                parent: relation.parent.clone(),
            });
        }
        Ok(())
    }
}
