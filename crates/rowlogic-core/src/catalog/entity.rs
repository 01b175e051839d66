//! Entity definitions.

use super::field::{FieldDef, FieldType};

/// An entity definition (table schema).
///
/// The primary key is always the implicit `id` attribute; it is not listed
/// among the fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    /// Entity name (unique within the catalog).
    pub name: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether the entity has a field with this name.
    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// All reference (foreign key) fields.
    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| matches!(f.field_type, FieldType::Reference { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("Item")
            .with_field(FieldDef::new("quantity", FieldType::Integer))
            .with_field(FieldDef::new("amount", FieldType::Decimal))
            .with_field(FieldDef::reference("order_id", "Order"));

        assert_eq!(entity.name, "Item");
        assert_eq!(entity.fields.len(), 3);
        assert!(entity.has_field("amount"));
        assert!(!entity.has_field("nonexistent"));
        assert_eq!(entity.reference_fields().count(), 1);
    }
}
