//! Validation error types
//!
//! This module defines error types for validation failures.

use std::fmt;

// ============================================================================
// Validation Result
// ============================================================================

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationErrors>;

// ============================================================================
// Validation Errors Collection
// ============================================================================

/// Collection of validation errors, in the order they were found
#[derive(Debug, Clone, Default)]
pub struct ValidationErrors {
    /// List of individual validation errors
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Create a new empty validation errors collection
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Add a validation error to the collection
    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Convert to Result - Ok if no errors, Err if there are errors
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Get errors as a slice
    pub fn as_slice(&self) -> &[ValidationError] {
        &self.errors
    }

    /// One diagnostic line per error
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ============================================================================
// Single Validation Error
// ============================================================================

/// A single validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Schema the payload was checked against (e.g., "Config", "DbObject")
    pub location: String,

    /// Field name or path (e.g., "values", "pool.maxPoolSize")
    pub field: String,

    /// Human-readable error message
    pub message: String,

    /// Error type classification
    pub error_type: ErrorType,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(location: String, field: String, message: String, error_type: ErrorType) -> Self {
        Self {
            location,
            field,
            message,
            error_type,
        }
    }

    /// Create a type error
    pub fn type_error(location: String, field: String, message: String) -> Self {
        Self::new(location, field, message, ErrorType::TypeError)
    }

    /// Create a value error
    pub fn value_error(location: String, field: String, message: String) -> Self {
        Self::new(location, field, message, ErrorType::ValueError)
    }

    /// Create a missing field error
    pub fn missing_error(location: String, field: String) -> Self {
        Self::new(
            location,
            field,
            "Field required".to_string(),
            ErrorType::Missing,
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}: {} [{}]", self.location, self.message, self.error_type)
        } else {
            write!(
                f,
                "{} ({}): {} [{}]",
                self.location, self.field, self.message, self.error_type
            )
        }
    }
}

// ============================================================================
// Error Type Classification
// ============================================================================

/// Classification of validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Type mismatch error (e.g., expected string, got integer)
    TypeError,

    /// Value constraint violation (e.g., string too long, number out of range)
    ValueError,

    /// Required field missing
    Missing,

    /// Invalid format (e.g., reserved collection name)
    FormatError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError => write!(f, "type_error"),
            Self::ValueError => write!(f, "value_error"),
            Self::Missing => write!(f, "missing"),
            Self::FormatError => write!(f, "format_error"),
        }
    }
}

// ============================================================================
// Validation Context
// ============================================================================

/// Context for validation (tracks current location in nested structures)
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Current path; the first element is the schema location
    pub path: Vec<String>,
}

impl ValidationContext {
    /// Create a new validation context
    pub fn new() -> Self {
        Self { path: Vec::new() }
    }

    /// Create a validation context with an initial location
    pub fn with_location(location: &str) -> Self {
        Self {
            path: vec![location.to_string()],
        }
    }

    /// Push a field name onto the path
    pub fn push(&mut self, field: &str) {
        self.path.push(field.to_string());
    }

    /// Pop a field name from the path
    pub fn pop(&mut self) {
        self.path.pop();
    }

    /// Get the current location (first element of path)
    pub fn location(&self) -> String {
        self.path.first().cloned().unwrap_or_default()
    }

    /// Get the current field (everything after location)
    pub fn field(&self) -> String {
        if self.path.len() > 1 {
            self.path[1..].join(".")
        } else {
            String::new()
        }
    }
}
