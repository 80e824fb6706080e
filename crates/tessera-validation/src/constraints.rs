//! Validation constraints for strings, numbers and object fields.

use crate::types::TypeDescriptor;

// ============================================================================
// String Constraints
// ============================================================================

/// Constraints for string validation
#[derive(Debug, Clone, Default)]
pub struct StringConstraints {
    /// Minimum length (in characters, not bytes)
    pub min_length: Option<usize>,
    /// Maximum length (in characters, not bytes)
    pub max_length: Option<usize>,
    /// Regex pattern (compiled at validation time)
    pub pattern: Option<String>,
    /// Predefined format validator
    pub format: Option<StringFormat>,
}

impl StringConstraints {
    /// Non-empty string
    pub fn non_empty() -> Self {
        Self {
            min_length: Some(1),
            ..Default::default()
        }
    }

    /// String matching a regex pattern
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    /// String with a predefined format
    pub fn format(format: StringFormat) -> Self {
        Self {
            format: Some(format),
            ..Default::default()
        }
    }
}

/// Predefined string format validators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    /// MongoDB collection name
    CollectionName,
    /// MongoDB database name
    DatabaseName,
}

// ============================================================================
// Numeric Constraints
// ============================================================================

/// Constraints for numeric validation (generic over i64 and f64)
#[derive(Debug, Clone, Default)]
pub struct NumericConstraints<T> {
    /// Minimum value (inclusive)
    pub minimum: Option<T>,
    /// Maximum value (inclusive)
    pub maximum: Option<T>,
}

impl<T> NumericConstraints<T> {
    /// Inclusive range
    pub fn range(minimum: Option<T>, maximum: Option<T>) -> Self {
        Self { minimum, maximum }
    }
}

// ============================================================================
// Field Descriptor (for Object validation)
// ============================================================================

/// Field descriptor for object/dictionary validation
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Type descriptor for this field
    pub type_desc: TypeDescriptor,
    /// Whether this field is required
    pub required: bool,
    /// Alternative input name accepted in place of `name`
    pub alias: Option<String>,
}

impl FieldDescriptor {
    /// Create a new required field descriptor
    pub fn new(name: impl Into<String>, type_desc: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            type_desc,
            required: true,
            alias: None,
        }
    }

    /// Set field as optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Accept an alternative input name
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_descriptor_builder() {
        let field = FieldDescriptor::new("serverURL", TypeDescriptor::String(StringConstraints::non_empty()))
            .alias("server_url");
        assert!(field.required);
        assert_eq!(field.alias.as_deref(), Some("server_url"));

        let field = field.optional();
        assert!(!field.required);
    }

    #[test]
    fn test_string_constraint_helpers() {
        assert_eq!(StringConstraints::non_empty().min_length, Some(1));
        assert_eq!(StringConstraints::pattern("^x$").pattern.as_deref(), Some("^x$"));
        assert_eq!(
            StringConstraints::format(StringFormat::CollectionName).format,
            Some(StringFormat::CollectionName)
        );
    }
}
