//! Core validation engine
//!
//! Validation accumulates errors rather than stopping at the first one, so a
//! report lists every violation in traversal order.

use crate::constraints::{FieldDescriptor, NumericConstraints, StringConstraints, StringFormat};
use crate::errors::{ErrorType, ValidationContext, ValidationError, ValidationErrors, ValidationResult};
use crate::formats;
use crate::schemas::Schema;
use crate::types::{TypeDescriptor, Value};
use regex::Regex;
use std::collections::HashSet;

// ============================================================================
// Public API
// ============================================================================

/// Pass/fail outcome of a schema check with its diagnostic messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

/// Validate a value against a schema
///
/// # Example
///
/// ```
/// use tessera_validation::{schemas, validate, Value};
///
/// let object = Value::Object(vec![
///     ("collection".to_string(), Value::String("users".to_string())),
///     ("values".to_string(), Value::Object(vec![])),
/// ]);
/// assert!(validate(&object, &schemas::database_object()).is_ok());
/// ```
pub fn validate(value: &Value, schema: &Schema) -> ValidationResult<()> {
    let mut ctx = ValidationContext::with_location(schema.id());
    let mut errors = ValidationErrors::new();

    validate_value(value, schema.root(), &mut ctx, &mut errors);

    errors.into_result()
}

/// Validate a value and report `(ok, messages)` instead of a `Result`
pub fn check(value: &Value, schema: &Schema) -> SchemaReport {
    match validate(value, schema) {
        Ok(()) => SchemaReport {
            ok: true,
            errors: Vec::new(),
        },
        Err(errors) => SchemaReport {
            ok: false,
            errors: errors.messages(),
        },
    }
}

// ============================================================================
// Core Validation Function
// ============================================================================

/// Validate a value against a type descriptor, appending to `errors`
pub fn validate_value(
    value: &Value,
    type_desc: &TypeDescriptor,
    ctx: &mut ValidationContext,
    errors: &mut ValidationErrors,
) {
    match type_desc {
        TypeDescriptor::String(constraints) => validate_string(value, constraints, ctx, errors),
        TypeDescriptor::Int64(constraints) => validate_int64(value, constraints, ctx, errors),
        TypeDescriptor::Float64(constraints) => validate_float64(value, constraints, ctx, errors),
        TypeDescriptor::Bool => {
            if !matches!(value, Value::Bool(_)) {
                add_type_error("boolean", value, ctx, errors);
            }
        }
        TypeDescriptor::Null => {
            if !value.is_null() {
                add_type_error("null", value, ctx, errors);
            }
        }
        TypeDescriptor::Bytes => {
            if !matches!(value, Value::Bytes(_)) {
                add_type_error("bytes", value, ctx, errors);
            }
        }
        TypeDescriptor::List(items) => validate_list(value, items, ctx, errors),
        TypeDescriptor::Object { fields, additional } => {
            validate_object(value, fields, additional.as_deref(), ctx, errors)
        }
        TypeDescriptor::Optional(inner) => {
            if !value.is_null() {
                validate_value(value, inner, ctx, errors);
            }
        }
        TypeDescriptor::Any => {}
    }
}

fn add_type_error(expected: &str, value: &Value, ctx: &ValidationContext, errors: &mut ValidationErrors) {
    errors.add(ValidationError::type_error(
        ctx.location(),
        ctx.field(),
        format!("Expected {}, got {}", expected, value.type_name()),
    ));
}

// ============================================================================
// String Validation
// ============================================================================

fn validate_string(
    value: &Value,
    constraints: &StringConstraints,
    ctx: &ValidationContext,
    errors: &mut ValidationErrors,
) {
    let s = match value {
        Value::String(s) => s,
        _ => {
            add_type_error("string", value, ctx, errors);
            return;
        }
    };

    // Length is counted in characters, not bytes
    let char_count = s.chars().count();

    if let Some(min) = constraints.min_length {
        if char_count < min {
            errors.add(ValidationError::value_error(
                ctx.location(),
                ctx.field(),
                format!("String must be at least {} characters (got {})", min, char_count),
            ));
        }
    }

    if let Some(max) = constraints.max_length {
        if char_count > max {
            errors.add(ValidationError::value_error(
                ctx.location(),
                ctx.field(),
                format!("String must be at most {} characters (got {})", max, char_count),
            ));
        }
    }

    if let Some(pattern) = &constraints.pattern {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(s) => {
                errors.add(ValidationError::value_error(
                    ctx.location(),
                    ctx.field(),
                    format!("String does not match pattern: {}", pattern),
                ));
            }
            Ok(_) => {}
            Err(_) => {
                errors.add(ValidationError::value_error(
                    ctx.location(),
                    ctx.field(),
                    format!("Invalid regex pattern: {}", pattern),
                ));
            }
        }
    }

    if let Some(format) = constraints.format {
        let outcome = match format {
            StringFormat::CollectionName => formats::validate_collection_name(s),
            StringFormat::DatabaseName => formats::validate_database_name(s),
        };
        if let Err(reason) = outcome {
            errors.add(ValidationError::new(
                ctx.location(),
                ctx.field(),
                reason,
                ErrorType::FormatError,
            ));
        }
    }
}

// ============================================================================
// Numeric Validation
// ============================================================================

fn validate_int64(
    value: &Value,
    constraints: &NumericConstraints<i64>,
    ctx: &ValidationContext,
    errors: &mut ValidationErrors,
) {
    match value {
        Value::Int(n) => validate_numeric_constraints(*n, constraints, ctx, errors),
        _ => add_type_error("integer", value, ctx, errors),
    }
}

fn validate_float64(
    value: &Value,
    constraints: &NumericConstraints<f64>,
    ctx: &ValidationContext,
    errors: &mut ValidationErrors,
) {
    let num = match value {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f64,
        _ => {
            add_type_error("number", value, ctx, errors);
            return;
        }
    };

    validate_numeric_constraints(num, constraints, ctx, errors);
}

fn validate_numeric_constraints<T>(
    value: T,
    constraints: &NumericConstraints<T>,
    ctx: &ValidationContext,
    errors: &mut ValidationErrors,
) where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if let Some(min) = constraints.minimum {
        if value < min {
            errors.add(ValidationError::value_error(
                ctx.location(),
                ctx.field(),
                format!("Value must be >= {} (got {})", min, value),
            ));
        }
    }

    if let Some(max) = constraints.maximum {
        if value > max {
            errors.add(ValidationError::value_error(
                ctx.location(),
                ctx.field(),
                format!("Value must be <= {} (got {})", max, value),
            ));
        }
    }
}

// ============================================================================
// Collection Types
// ============================================================================

fn validate_list(
    value: &Value,
    item_type: &TypeDescriptor,
    ctx: &mut ValidationContext,
    errors: &mut ValidationErrors,
) {
    match value {
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                ctx.push(&format!("[{}]", i));
                validate_value(item, item_type, ctx, errors);
                ctx.pop();
            }
        }
        _ => add_type_error("array", value, ctx, errors),
    }
}

fn validate_object(
    value: &Value,
    fields: &[FieldDescriptor],
    additional: Option<&TypeDescriptor>,
    ctx: &mut ValidationContext,
    errors: &mut ValidationErrors,
) {
    let pairs = match value {
        Value::Object(pairs) => pairs,
        _ => {
            add_type_error("object", value, ctx, errors);
            return;
        }
    };

    let mut known_fields: HashSet<&str> = HashSet::new();

    for field_desc in fields {
        known_fields.insert(field_desc.name.as_str());
        if let Some(alias) = &field_desc.alias {
            known_fields.insert(alias.as_str());
        }

        let found = pairs
            .iter()
            .find(|(k, _)| *k == field_desc.name)
            .or_else(|| {
                field_desc
                    .alias
                    .as_ref()
                    .and_then(|alias| pairs.iter().find(|(k, _)| k == alias))
            });

        match found {
            Some((key, field_value)) => {
                ctx.push(key);
                validate_value(field_value, &field_desc.type_desc, ctx, errors);
                ctx.pop();
            }
            None if field_desc.required => {
                ctx.push(&field_desc.name);
                errors.add(ValidationError::missing_error(ctx.location(), ctx.field()));
                ctx.pop();
            }
            None => {}
        }
    }

    if let Some(additional_type) = additional {
        for (key, val) in pairs {
            if !known_fields.contains(key.as_str()) {
                ctx.push(key);
                validate_value(val, additional_type, ctx, errors);
                ctx.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_field(name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name, TypeDescriptor::String(StringConstraints::non_empty()))
    }

    fn object(fields: Vec<FieldDescriptor>) -> TypeDescriptor {
        TypeDescriptor::Object {
            fields,
            additional: None,
        }
    }

    fn run(value: &Value, desc: &TypeDescriptor) -> ValidationErrors {
        let mut ctx = ValidationContext::with_location("Test");
        let mut errors = ValidationErrors::new();
        validate_value(value, desc, &mut ctx, &mut errors);
        errors
    }

    #[test]
    fn test_string_type_mismatch() {
        let errors = run(&Value::Int(1), &TypeDescriptor::String(Default::default()));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].error_type, ErrorType::TypeError);
    }

    #[test]
    fn test_string_pattern() {
        let desc = TypeDescriptor::String(StringConstraints::pattern(r"^\d+$"));
        assert!(run(&Value::String("27017".to_string()), &desc).is_empty());
        assert_eq!(run(&Value::String("port".to_string()), &desc).len(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let desc = TypeDescriptor::String(StringConstraints::pattern("("));
        let errors = run(&Value::String("x".to_string()), &desc);
        assert!(errors.errors[0].message.starts_with("Invalid regex pattern"));
    }

    #[test]
    fn test_collection_name_format() {
        let desc = TypeDescriptor::String(StringConstraints::format(StringFormat::CollectionName));
        assert!(run(&Value::String("orders".to_string()), &desc).is_empty());

        let errors = run(&Value::String("system.profile".to_string()), &desc);
        assert_eq!(errors.errors[0].error_type, ErrorType::FormatError);
    }

    #[test]
    fn test_int_range() {
        let desc = TypeDescriptor::Int64(NumericConstraints::range(Some(1), Some(10)));
        assert!(run(&Value::Int(5), &desc).is_empty());
        assert_eq!(run(&Value::Int(0), &desc).len(), 1);
        assert_eq!(run(&Value::Int(11), &desc).len(), 1);
        assert_eq!(run(&Value::Float(5.0), &desc).len(), 1);
    }

    #[test]
    fn test_float_accepts_int() {
        let desc = TypeDescriptor::Float64(Default::default());
        assert!(run(&Value::Int(3), &desc).is_empty());
    }

    #[test]
    fn test_object_required_and_alias() {
        let desc = object(vec![string_field("dbName").alias("db_name"), string_field("serverURL")]);

        let value = Value::Object(vec![("db_name".to_string(), Value::String("app".to_string()))]);
        let errors = run(&value, &desc);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].field, "serverURL");
        assert_eq!(errors.errors[0].error_type, ErrorType::Missing);
    }

    #[test]
    fn test_object_collects_every_error() {
        let desc = object(vec![string_field("a"), string_field("b"), string_field("c")]);
        let value = Value::Object(vec![("b".to_string(), Value::Bool(true))]);

        let fields: Vec<String> = run(&value, &desc)
            .errors
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_additional_properties() {
        let desc = TypeDescriptor::Object {
            fields: vec![],
            additional: Some(Box::new(TypeDescriptor::String(Default::default()))),
        };
        let value = Value::Object(vec![
            ("users".to_string(), Value::String("people".to_string())),
            ("orders".to_string(), Value::Int(3)),
        ]);
        let errors = run(&value, &desc);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].field, "orders");
    }

    #[test]
    fn test_optional_and_list() {
        let desc = TypeDescriptor::Optional(Box::new(TypeDescriptor::List(Box::new(TypeDescriptor::Bool))));
        assert!(run(&Value::Null, &desc).is_empty());
        assert!(run(&Value::List(vec![Value::Bool(true)]), &desc).is_empty());

        let errors = run(&Value::List(vec![Value::Bool(true), Value::Int(1)]), &desc);
        assert_eq!(errors.errors[0].field, "[1]");
    }
}
