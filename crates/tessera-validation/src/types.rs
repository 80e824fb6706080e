//! Core type system for validation
//!
//! This module defines the type descriptors and value types used for validation.

use crate::constraints::{FieldDescriptor, NumericConstraints, StringConstraints};

// ============================================================================
// Value Enum - Runtime values to be validated
// ============================================================================

/// Runtime value that can be validated
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (i64)
    Int(i64),
    /// Float value (f64)
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// List/Array of values
    List(Vec<Value>),
    /// Object/Dictionary (key-value pairs, insertion ordered)
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Get human-readable type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Look up a key on an object value
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

// ============================================================================
// TypeDescriptor - Type definitions for validation
// ============================================================================

/// Type descriptor for validation
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    /// String type with constraints (length, pattern, format)
    String(StringConstraints),

    /// Integer type with numeric constraints (i64)
    Int64(NumericConstraints<i64>),

    /// Float type with numeric constraints (f64); integers are accepted
    Float64(NumericConstraints<f64>),

    /// Boolean type
    Bool,

    /// Null type
    Null,

    /// Binary data type
    Bytes,

    /// List/Array type with item type
    List(Box<TypeDescriptor>),

    /// Object/Dictionary type with named fields
    Object {
        /// Field descriptors (name, type, required)
        fields: Vec<FieldDescriptor>,
        /// Type for additional properties not in fields (unchecked when None)
        additional: Option<Box<TypeDescriptor>>,
    },

    /// Optional type (nullable)
    Optional(Box<TypeDescriptor>),

    /// Any type (no validation)
    Any,
}

impl TypeDescriptor {
    /// Get human-readable type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int64(_) => "integer",
            Self::Float64(_) => "float",
            Self::Bool => "boolean",
            Self::Null => "null",
            Self::Bytes => "bytes",
            Self::List(_) => "array",
            Self::Object { .. } => "object",
            Self::Optional(_) => "optional",
            Self::Any => "any",
        }
    }

    /// An object accepting any shape
    pub fn any_object() -> Self {
        Self::Object {
            fields: Vec::new(),
            additional: Some(Box::new(Self::Any)),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

#[cfg(feature = "serde")]
impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// BSON-specific types have no validation counterpart and are carried as
/// their string form.
#[cfg(feature = "bson")]
impl From<&bson::Bson> for Value {
    fn from(bson: &bson::Bson) -> Self {
        use bson::Bson;

        match bson {
            Bson::Double(f) => Value::Float(*f),
            Bson::String(s) => Value::String(s.clone()),
            Bson::Array(arr) => Value::List(arr.iter().map(Value::from).collect()),
            Bson::Document(doc) => Value::from(doc),
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Int32(i) => Value::Int(*i as i64),
            Bson::Int64(i) => Value::Int(*i),
            Bson::Binary(bin) => Value::Bytes(bin.bytes.clone()),
            Bson::ObjectId(oid) => Value::String(oid.to_hex()),
            Bson::DateTime(dt) => Value::String(dt.to_string()),
            Bson::Decimal128(d) => Value::String(d.to_string()),
            Bson::Symbol(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }
}

#[cfg(feature = "bson")]
impl From<&bson::Document> for Value {
    fn from(doc: &bson::Document) -> Self {
        Value::Object(
            doc.iter()
                .map(|(k, v)| (k.clone(), Value::from(v)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_name() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Bool(true).type_name(), "boolean");
        assert_eq!(Value::Int(42).type_name(), "integer");
        assert_eq!(Value::Float(2.5).type_name(), "float");
        assert_eq!(Value::String("test".to_string()).type_name(), "string");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).type_name(), "bytes");
        assert_eq!(Value::List(vec![]).type_name(), "array");
        assert_eq!(Value::Object(vec![]).type_name(), "object");
    }

    #[test]
    fn test_value_get() {
        let obj = Value::Object(vec![("dbName".to_string(), Value::String("app".to_string()))]);
        assert_eq!(obj.get("dbName"), Some(&Value::String("app".to_string())));
        assert_eq!(obj.get("port"), None);
        assert_eq!(Value::Null.get("dbName"), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json() {
        let json = serde_json::json!({ "port": "27017", "limit": 5, "ratio": 0.5, "tags": ["a"] });
        let value = Value::from(&json);
        assert_eq!(value.get("port"), Some(&Value::String("27017".to_string())));
        assert_eq!(value.get("limit"), Some(&Value::Int(5)));
        assert_eq!(value.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(
            value.get("tags"),
            Some(&Value::List(vec![Value::String("a".to_string())]))
        );
    }

    #[cfg(feature = "bson")]
    #[test]
    fn test_from_bson_document() {
        let doc = bson::doc! { "collection": "users", "values": { "age": 30_i32 } };
        let value = Value::from(&doc);
        assert_eq!(value.get("collection"), Some(&Value::String("users".to_string())));
        assert_eq!(
            value.get("values"),
            Some(&Value::Object(vec![("age".to_string(), Value::Int(30))]))
        );
    }

    #[test]
    fn test_any_object_type_name() {
        assert_eq!(TypeDescriptor::any_object().type_name(), "object");
        assert_eq!(TypeDescriptor::Any.type_name(), "any");
    }
}
