//! Format validators for MongoDB namespace strings
//!
//! Each validator returns `Err(reason)` describing the first rule the input breaks.

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
pub const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for database names
pub const MAX_DATABASE_NAME_LENGTH: usize = 63;

/// Characters MongoDB refuses in database names
const DATABASE_NAME_FORBIDDEN: &[char] = &['/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?'];

/// Validate a collection name
///
/// Rejects empty names, names over 120 characters, NUL bytes, `$` and the
/// reserved `system.` prefix.
pub fn validate_collection_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Collection name cannot be empty".to_string());
    }

    if name.len() > MAX_COLLECTION_NAME_LENGTH {
        return Err(format!(
            "Collection name exceeds maximum length of {} characters",
            MAX_COLLECTION_NAME_LENGTH
        ));
    }

    if name.contains('\0') {
        return Err("Collection name cannot contain null bytes".to_string());
    }

    if name.starts_with("system.") {
        return Err(format!(
            "Collection name cannot start with 'system.' (reserved): '{}'",
            name
        ));
    }

    if name.contains('$') {
        return Err(format!(
            "Collection name cannot contain '$' character: '{}'",
            name
        ));
    }

    Ok(())
}

/// Validate a database name
pub fn validate_database_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Database name cannot be empty".to_string());
    }

    if name.len() > MAX_DATABASE_NAME_LENGTH {
        return Err(format!(
            "Database name exceeds maximum length of {} characters",
            MAX_DATABASE_NAME_LENGTH
        ));
    }

    if let Some(c) = name
        .chars()
        .find(|c| *c == '\0' || DATABASE_NAME_FORBIDDEN.contains(c))
    {
        return Err(format!("Database name cannot contain {:?}: '{}'", c, name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("fs.files").is_ok());
        assert!(validate_collection_name("user_profiles_2024").is_ok());
    }

    #[test]
    fn test_invalid_collection_names() {
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("system.users").is_err());
        assert!(validate_collection_name("users$").is_err());
        assert!(validate_collection_name("us\0ers").is_err());
        assert!(validate_collection_name(&"a".repeat(121)).is_err());
    }

    #[test]
    fn test_database_names() {
        assert!(validate_database_name("inventory").is_ok());
        assert!(validate_database_name("my-app_01").is_ok());
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name("my.db").is_err());
        assert!(validate_database_name("my db").is_err());
        assert!(validate_database_name(&"d".repeat(64)).is_err());
    }
}
