//! Fixed schemas for the configuration file and the generic database object.

use once_cell::sync::Lazy;

use crate::constraints::{FieldDescriptor, NumericConstraints, StringConstraints, StringFormat};
use crate::types::TypeDescriptor;

/// A named root type descriptor
#[derive(Debug, Clone)]
pub struct Schema {
    id: &'static str,
    root: TypeDescriptor,
}

impl Schema {
    pub fn new(id: &'static str, root: TypeDescriptor) -> Self {
        Self { id, root }
    }

    /// Schema identifier, reported as the location of every error
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn root(&self) -> &TypeDescriptor {
        &self.root
    }
}

static CONFIG: Lazy<Schema> = Lazy::new(|| {
    let positive = || TypeDescriptor::Int64(NumericConstraints::range(Some(0), None));

    let pool = TypeDescriptor::Object {
        fields: vec![
            FieldDescriptor::new("minPoolSize", positive()).optional(),
            FieldDescriptor::new(
                "maxPoolSize",
                TypeDescriptor::Int64(NumericConstraints::range(Some(1), None)),
            )
            .optional(),
            FieldDescriptor::new("maxIdleTimeMs", positive()).optional(),
            FieldDescriptor::new("connectTimeoutMs", positive()).optional(),
            FieldDescriptor::new("serverSelectionTimeoutMs", positive()).optional(),
            FieldDescriptor::new("appName", TypeDescriptor::String(StringConstraints::non_empty()))
                .optional(),
        ],
        additional: None,
    };

    Schema::new(
        "Config",
        TypeDescriptor::Object {
            fields: vec![
                FieldDescriptor::new("serverURL", TypeDescriptor::String(StringConstraints::non_empty()))
                    .alias("server_url"),
                FieldDescriptor::new(
                    "port",
                    TypeDescriptor::String(StringConstraints::pattern(r"^[0-9]{1,5}$")),
                )
                .alias("server_port")
                .optional(),
                FieldDescriptor::new(
                    "dbName",
                    TypeDescriptor::String(StringConstraints::format(StringFormat::DatabaseName)),
                )
                .alias("db_name"),
                FieldDescriptor::new(
                    "collections",
                    TypeDescriptor::Object {
                        fields: vec![],
                        additional: Some(Box::new(TypeDescriptor::String(StringConstraints::format(
                            StringFormat::CollectionName,
                        )))),
                    },
                )
                .optional(),
                FieldDescriptor::new("pool", pool).optional(),
            ],
            additional: None,
        },
    )
});

static DATABASE_OBJECT: Lazy<Schema> = Lazy::new(|| {
    Schema::new(
        "DbObject",
        TypeDescriptor::Object {
            fields: vec![
                FieldDescriptor::new(
                    "collection",
                    TypeDescriptor::String(StringConstraints::format(StringFormat::CollectionName)),
                ),
                FieldDescriptor::new("values", TypeDescriptor::any_object()).optional(),
            ],
            additional: None,
        },
    )
});

/// Schema of the configuration file
pub fn config() -> &'static Schema {
    &CONFIG
}

/// Schema of a `{ collection, values }` database object
pub fn database_object() -> &'static Schema {
    &DATABASE_OBJECT
}
