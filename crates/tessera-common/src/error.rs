//! Error types for tessera

use thiserror::Error;

/// Result type alias for tessera operations
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Unified error type for all tessera operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TesseraError {
    /// Payload failed schema validation; no store call was issued
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store unreachable or the shared handle is stale
    #[error("Connection error: {0}")]
    Connection(String),

    /// Store rejected the specific operation
    #[error("Operation error: {0}")]
    Operation(String),

    /// Post-write verification read back a different number of bytes
    #[error("Size mismatch: wrote {expected} bytes, read back {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Large object name is missing")]
    MissingName,

    #[error("Nothing to insert: both metadata and payload are empty")]
    NothingToInsert,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Returns true if the shared store handle should be considered dead
    pub fn is_connection_error(&self) -> bool {
        matches!(self, TesseraError::Connection(_))
    }

    /// Returns true if repeating the call (after a reconnect) may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TesseraError::Connection(_) | TesseraError::Io(_))
    }

    /// Returns true for caller-input contract violations
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TesseraError::Validation(_)
                | TesseraError::MissingName
                | TesseraError::NothingToInsert
        )
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(err: serde_json::Error) -> Self {
        TesseraError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TesseraError {
    fn from(err: std::io::Error) -> Self {
        TesseraError::Io(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for TesseraError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, GridFsErrorKind};

        match err.kind.as_ref() {
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Shutdown => TesseraError::Connection(err.to_string()),
            ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. }) => {
                TesseraError::NotFound(err.to_string())
            }
            ErrorKind::BsonSerialization(_) => TesseraError::Serialization(err.to_string()),
            ErrorKind::BsonDeserialization(_) => TesseraError::Deserialization(err.to_string()),
            _ => TesseraError::Operation(err.to_string()),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for TesseraError {
    fn from(err: bson::ser::Error) -> Self {
        TesseraError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for TesseraError {
    fn from(err: bson::de::Error) -> Self {
        TesseraError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = TesseraError::Validation("collection is required".to_string());
        assert_eq!(err.to_string(), "Validation error: collection is required");
    }

    #[test]
    fn test_error_display_connection() {
        let err = TesseraError::Connection("timeout".to_string());
        assert_eq!(err.to_string(), "Connection error: timeout");
    }

    #[test]
    fn test_error_display_size_mismatch() {
        let err = TesseraError::SizeMismatch {
            expected: 10,
            actual: 4,
        };
        assert_eq!(err.to_string(), "Size mismatch: wrote 10 bytes, read back 4");
    }

    #[test]
    fn test_error_display_input_contract() {
        assert_eq!(
            TesseraError::MissingName.to_string(),
            "Large object name is missing"
        );
        assert_eq!(
            TesseraError::NothingToInsert.to_string(),
            "Nothing to insert: both metadata and payload are empty"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: TesseraError = json_err.into();
        assert!(matches!(err, TesseraError::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "config.json");
        let err: TesseraError = io_err.into();
        assert!(matches!(err, TesseraError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(TesseraError::Connection("test".to_string()).is_connection_error());
        assert!(!TesseraError::Operation("test".to_string()).is_connection_error());
        assert!(!TesseraError::NotFound("test".to_string()).is_connection_error());
    }

    #[test]
    fn test_is_input_error() {
        assert!(TesseraError::MissingName.is_input_error());
        assert!(TesseraError::NothingToInsert.is_input_error());
        assert!(TesseraError::Validation("test".to_string()).is_input_error());
        assert!(!TesseraError::SizeMismatch { expected: 1, actual: 0 }.is_input_error());
    }
}
