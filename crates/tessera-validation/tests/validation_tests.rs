//! Schema validation tests against the built-in schemas

use tessera_validation::constraints::*;
use tessera_validation::types::*;
use tessera_validation::{check, schemas, validate, ErrorType, Schema};

fn s(v: &str) -> Value {
    Value::String(v.to_string())
}

fn obj(pairs: Vec<(&str, Value)>) -> Value {
    Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

// ============================================================================
// Custom Schemas
// ============================================================================

#[test]
fn test_custom_schema_location() {
    let schema = Schema::new(
        "Upload",
        TypeDescriptor::Object {
            fields: vec![FieldDescriptor::new(
                "name",
                TypeDescriptor::String(StringConstraints {
                    min_length: Some(1),
                    max_length: Some(8),
                    ..Default::default()
                }),
            )],
            additional: None,
        },
    );

    assert!(validate(&obj(vec![("name", s("logo.png"))]), &schema).is_ok());

    let errors = validate(&obj(vec![("name", s("a-very-long-name"))]), &schema).unwrap_err();
    assert_eq!(errors.errors[0].location, "Upload");
    assert_eq!(errors.errors[0].field, "name");
    assert_eq!(errors.errors[0].error_type, ErrorType::ValueError);
}

// ============================================================================
// Config Schema
// ============================================================================

#[test]
fn test_config_full() {
    let value = obj(vec![
        ("serverURL", s("mongo.internal")),
        ("port", s("27017")),
        ("dbName", s("catalog")),
        ("collections", obj(vec![("products", s("products")), ("media", s("media"))])),
        (
            "pool",
            obj(vec![
                ("minPoolSize", Value::Int(1)),
                ("maxPoolSize", Value::Int(10)),
                ("appName", s("catalog-api")),
            ]),
        ),
    ]);

    let report = check(&value, schemas::config());
    assert!(report.ok, "{:?}", report.errors);
    assert!(report.errors.is_empty());
}

#[test]
fn test_config_rejects_non_numeric_port() {
    let value = obj(vec![
        ("serverURL", s("localhost")),
        ("port", s("http")),
        ("dbName", s("app")),
    ]);
    let report = check(&value, schemas::config());
    assert!(!report.ok);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("does not match pattern"));
}

#[test]
fn test_config_rejects_bad_database_name() {
    let value = obj(vec![("serverURL", s("localhost")), ("dbName", s("my/db"))]);
    let errors = validate(&value, schemas::config()).unwrap_err();
    assert_eq!(errors.errors[0].error_type, ErrorType::FormatError);
}

#[test]
fn test_config_rejects_reserved_collection_mapping() {
    let value = obj(vec![
        ("serverURL", s("localhost")),
        ("dbName", s("app")),
        ("collections", obj(vec![("profile", s("system.profile"))])),
    ]);
    let errors = validate(&value, schemas::config()).unwrap_err();
    assert_eq!(errors.errors[0].field, "collections.profile");
}

#[test]
fn test_config_must_be_object() {
    let report = check(&Value::List(vec![]), schemas::config());
    assert!(!report.ok);
    assert_eq!(report.errors, vec!["Config: Expected object, got array [type_error]".to_string()]);
}

// ============================================================================
// Database Object Schema
// ============================================================================

#[test]
fn test_database_object_values_optional() {
    assert!(validate(&obj(vec![("collection", s("users"))]), schemas::database_object()).is_ok());
}

#[test]
fn test_database_object_permissive_values() {
    let value = obj(vec![
        ("collection", s("users")),
        (
            "values",
            obj(vec![
                ("age", obj(vec![("$gte", Value::Int(18))])),
                ("tags", Value::List(vec![s("a"), Value::Null])),
                ("avatar", Value::Bytes(vec![0, 1, 2])),
            ]),
        ),
    ]);
    assert!(validate(&value, schemas::database_object()).is_ok());
}

#[test]
fn test_database_object_collection_type() {
    let errors = validate(
        &obj(vec![("collection", Value::Int(3))]),
        schemas::database_object(),
    )
    .unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors[0].error_type, ErrorType::TypeError);
    assert_eq!(errors.errors[0].location, "DbObject");
}
