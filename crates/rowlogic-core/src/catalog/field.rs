//! Field definitions for entities.

use rust_decimal::Decimal;

use crate::value::{EvaluationError, Value};

/// Name of the implicit primary key attribute.
pub const PRIMARY_KEY: &str = "id";

/// Semantic type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit signed integer.
    Integer,
    /// Fixed-point decimal.
    Decimal,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// Foreign key to a parent entity's `id`.
    Reference {
        /// Referenced entity name.
        entity: String,
    },
}

impl FieldType {
    /// Create a reference type.
    pub fn reference(entity: impl Into<String>) -> Self {
        FieldType::Reference {
            entity: entity.into(),
        }
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Decimal)
    }

    /// Human-readable type name.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::String => "string",
            FieldType::Timestamp => "timestamp",
            FieldType::Reference { .. } => "reference",
        }
    }

    /// Convert a value into this type's canonical representation.
    ///
    /// Null passes through unchanged. Integers widen to decimals, integral
    /// decimals narrow to integers, and non-negative integers are accepted
    /// as references.
    pub fn coerce(&self, value: Value) -> Result<Value, EvaluationError> {
        let mismatch = |value: &Value| EvaluationError::TypeMismatch {
            expected: self.name(),
            actual: value.type_name(),
        };

        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Integer, value) => value
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| mismatch(&value)),
            (FieldType::Decimal, value) => value
                .as_decimal()
                .map(Value::Decimal)
                .ok_or_else(|| mismatch(&value)),
            (FieldType::String, Value::String(s)) => Ok(Value::String(s)),
            (FieldType::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(ts)),
            (FieldType::Timestamp, Value::Int(ts)) => Ok(Value::Timestamp(ts)),
            (FieldType::Reference { .. }, Value::Ref(id)) => Ok(Value::Ref(id)),
            (FieldType::Reference { .. }, Value::Int(id)) if id >= 0 => Ok(Value::Ref(id as u64)),
            (_, value) => Err(mismatch(&value)),
        }
    }
}

/// Default applied when an insert omits the field.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A fixed value.
    Value(Value),
    /// Current timestamp (evaluated at insert time).
    CurrentTimestamp,
}

impl DefaultValue {
    /// The value to store for an insert happening now.
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::CurrentTimestamp => Value::now(),
        }
    }
}

/// A field definition within an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field must be non-null on insert.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<DefaultValue>,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
        }
    }

    /// Create an optional (nullable) field.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
        }
    }

    /// Create a required reference field.
    pub fn reference(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, FieldType::reference(entity))
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(default.into()));
        self
    }

    /// Default to the insert time.
    pub fn with_now_default(mut self) -> Self {
        self.default = Some(DefaultValue::CurrentTimestamp);
        self
    }

    /// Default of zero for numeric fields.
    pub fn with_zero_default(self) -> Self {
        match self.field_type {
            FieldType::Integer => self.with_default(0i64),
            _ => self.with_default(Decimal::ZERO),
        }
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// The referenced entity, if this is a foreign key.
    pub fn referenced_entity(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::Reference { entity } => Some(entity),
            _ => None,
        }
    }
}
