//! Row values and identities.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::PRIMARY_KEY;
use crate::value::{EvaluationError, Value};

/// Identity of a row: entity type plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    /// Entity type name.
    pub entity: String,
    /// Primary key, assigned on insert.
    pub id: u64,
}

impl RowKey {
    /// Create a row key.
    pub fn new(entity: impl Into<String>, id: u64) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

/// A row: its identity and current attribute values.
///
/// Rows never hold references to other rows; relations are followed by
/// looking up the parent key stored in a reference attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Row identity.
    pub key: RowKey,
    /// Attribute values by name.
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new(key: RowKey) -> Self {
        Self {
            key,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    /// Entity type name.
    pub fn entity(&self) -> &str {
        &self.key.entity
    }

    /// Primary key.
    pub fn id(&self) -> u64 {
        self.key.id
    }

    /// Get an attribute value.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    /// Get an attribute value, treating absent attributes as null.
    pub fn value(&self, attribute: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(attribute).unwrap_or(&NULL)
    }

    /// Set an attribute value, returning the previous one.
    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(attribute.into(), value.into())
    }

    /// Check whether an attribute is null or absent.
    pub fn is_null(&self, attribute: &str) -> bool {
        self.value(attribute).is_null()
    }

    /// Parent id held in a reference attribute.
    pub fn reference(&self, attribute: &str) -> Option<u64> {
        self.value(attribute).as_ref_id()
    }

    /// Every non-null reference attribute with the parent id it holds.
    pub fn references(&self) -> impl Iterator<Item = (&str, u64)> {
        self.values
            .iter()
            .filter_map(|(name, value)| value.as_ref_id().map(|id| (name.as_str(), id)))
    }

    /// Numeric attribute as a decimal.
    ///
    /// Fails on absent, null, or non-numeric attributes so formulas never
    /// silently compute with a missing operand.
    pub fn decimal(&self, attribute: &str) -> Result<Decimal, EvaluationError> {
        match self.values.get(attribute) {
            None => Err(EvaluationError::UnknownField(attribute.to_string())),
            Some(Value::Null) => Err(EvaluationError::NullOperand(attribute.to_string())),
            Some(value) => value
                .as_decimal()
                .ok_or(EvaluationError::TypeMismatch {
                    expected: "decimal",
                    actual: value.type_name(),
                }),
        }
    }

    /// Numeric attribute as a decimal, with null or absent read as zero.
    pub fn decimal_or_zero(&self, attribute: &str) -> Result<Decimal, EvaluationError> {
        match self.value(attribute) {
            Value::Null => Ok(Decimal::ZERO),
            value => value.as_decimal().ok_or(EvaluationError::TypeMismatch {
                expected: "decimal",
                actual: value.type_name(),
            }),
        }
    }

    /// Substitute `{attribute}` placeholders with this row's values.
    ///
    /// `{id}` renders the primary key. Unknown placeholders are left as-is.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    if name == PRIMARY_KEY {
                        out.push_str(&self.key.id.to_string());
                    } else if let Some(value) = self.values.get(name) {
                        out.push_str(&value.to_string());
                    } else {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Row {
        Row::new(RowKey::new("Customer", 1))
            .with("name", "Customer One")
            .with("balance", Decimal::new(104000, 2))
            .with("credit_limit", Decimal::from(1000))
            .with("notes", Value::Null)
    }

    #[test]
    fn test_render_message() {
        let row = customer();
        assert_eq!(
            row.render("Customer {name} balance ({balance}) exceeds credit limit ({credit_limit})"),
            "Customer Customer One balance (1040.00) exceeds credit limit (1000)"
        );
        assert_eq!(row.render("#{id} {missing}"), "#1 {missing}");
        assert_eq!(row.render("unterminated {name"), "unterminated {name");
    }

    #[test]
    fn test_decimal_accessors() {
        let row = customer().with("quantity", 3i64);
        assert_eq!(row.decimal("quantity"), Ok(Decimal::from(3)));
        assert_eq!(
            row.decimal("notes"),
            Err(EvaluationError::NullOperand("notes".into()))
        );
        assert_eq!(
            row.decimal("unknown"),
            Err(EvaluationError::UnknownField("unknown".into()))
        );
        assert_eq!(row.decimal_or_zero("notes"), Ok(Decimal::ZERO));
        assert!(row.decimal("name").is_err());
    }

    #[test]
    fn test_key_display_and_order() {
        let a = RowKey::new("Item", 2);
        let b = RowKey::new("Item", 10);
        assert_eq!(a.to_string(), "Item#2");
        assert!(a < b);
    }
}
