//! Tessera Validation
//!
//! Schema validation for tessera payloads: the configuration file and the
//! generic `{ collection, values }` database object.
//!
//! Validation is pure and deterministic. A failed check yields every
//! violation found, each with its schema, field path and error type.
//!
//! # Features
//!
//! - **Default**: Core validation
//! - **serde**: conversion from `serde_json::Value`
//! - **bson**: conversion from BSON documents
//!
//! # Example
//!
//! ```rust
//! use tessera_validation::{check, schemas, Value};
//!
//! let config = Value::Object(vec![
//!     ("serverURL".to_string(), Value::String("localhost".to_string())),
//! ]);
//!
//! let report = check(&config, schemas::config());
//! assert!(!report.ok);
//! assert_eq!(report.errors, vec!["Config (dbName): Field required [missing]".to_string()]);
//! ```

pub mod constraints;
pub mod errors;
pub mod formats;
pub mod schemas;
pub mod types;
pub mod validators;

pub use constraints::{FieldDescriptor, NumericConstraints, StringConstraints, StringFormat};
pub use errors::{ErrorType, ValidationContext, ValidationError, ValidationErrors, ValidationResult};
pub use schemas::Schema;
pub use types::{TypeDescriptor, Value};
pub use validators::{check, validate, validate_value, SchemaReport};
