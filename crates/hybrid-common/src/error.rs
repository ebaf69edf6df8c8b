//! Error types for hybrid

use thiserror::Error;

/// Result type alias for hybrid operations
pub type Result<T> = std::result::Result<T, HybridError>;

/// Unified error type for all hybrid operations
#[derive(Error, Debug, Clone)]
pub enum HybridError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Single-row lookup matched nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing field on a record
    #[error("Attribute error: {0}")]
    Attribute(String),

    /// Record type name not present in the registry
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Statement affected a different row than expected.
    ///
    /// Never recoverable: the caller must not catch and retry.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // PostgreSQL-specific error types

    /// Unique constraint violation (SQLSTATE 23505)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Foreign key constraint violation (SQLSTATE 23503)
    #[error("Foreign key constraint violation: {0}")]
    ForeignKey(String),

    /// Pool acquire or statement timeout
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl HybridError {
    /// Returns true for the expected-absence class, the only one a caller may suppress
    pub fn is_not_found(&self) -> bool {
        matches!(self, HybridError::NotFound(_))
    }

    /// Returns true if this error signals corrupted state
    pub fn is_fatal(&self) -> bool {
        matches!(self, HybridError::Integrity(_))
    }

    /// Returns true if this is a constraint violation error
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, HybridError::Conflict(_) | HybridError::ForeignKey(_))
    }
}

impl From<serde_json::Error> for HybridError {
    fn from(err: serde_json::Error) -> Self {
        HybridError::Serialization(err.to_string())
    }
}

// PostgreSQL-specific error conversions (when postgres-errors feature is enabled)
#[cfg(feature = "postgres-errors")]
impl From<sqlx::Error> for HybridError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        match &err {
            Error::Configuration(_) => HybridError::Connection(err.to_string()),
            Error::Database(db_err) => {
                // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
                if let Some(code) = db_err.code() {
                    let code_str: &str = &code;
                    match code_str {
                        "23505" | "23P01" => return HybridError::Conflict(err.to_string()),
                        "23503" => return HybridError::ForeignKey(err.to_string()),
                        "23502" | "23514" => return HybridError::Validation(err.to_string()),
                        "57014" => return HybridError::Timeout(err.to_string()),
                        code if code.starts_with("08") => {
                            return HybridError::Connection(err.to_string())
                        }
                        _ => {}
                    }
                }
                HybridError::Database(err.to_string())
            }
            Error::Io(_) | Error::Tls(_) | Error::Protocol(_) => {
                HybridError::Connection(err.to_string())
            }
            Error::RowNotFound => HybridError::NotFound("Row not found".to_string()),
            Error::TypeNotFound { .. } => HybridError::Deserialization(err.to_string()),
            Error::ColumnIndexOutOfBounds { .. } => HybridError::Query(err.to_string()),
            Error::ColumnNotFound(_) => HybridError::Query(err.to_string()),
            Error::ColumnDecode { .. } => HybridError::Deserialization(err.to_string()),
            Error::Decode(_) => HybridError::Deserialization(err.to_string()),
            Error::PoolTimedOut => HybridError::Timeout("Connection pool timed out".to_string()),
            Error::PoolClosed => HybridError::Connection("Connection pool closed".to_string()),
            Error::WorkerCrashed => HybridError::Internal("Worker thread crashed".to_string()),
            _ => HybridError::Database(err.to_string()),
        }
    }
}

#[cfg(feature = "redis-errors")]
impl From<redis::RedisError> for HybridError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            HybridError::Timeout(err.to_string())
        } else {
            HybridError::Cache(err.to_string())
        }
    }
}

#[cfg(feature = "redis-errors")]
impl From<deadpool_redis::PoolError> for HybridError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        HybridError::Cache(format!("Failed to get cache connection: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_database() {
        let err = HybridError::Database("invalid query".to_string());
        assert_eq!(err.to_string(), "Database error: invalid query");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = HybridError::NotFound("users where id = 7".to_string());
        assert_eq!(err.to_string(), "Not found: users where id = 7");
    }

    #[test]
    fn test_error_display_unknown_model() {
        let err = HybridError::UnknownModel("order_item".to_string());
        assert_eq!(err.to_string(), "Unknown model: order_item");
    }

    #[test]
    fn test_error_display_integrity() {
        let err = HybridError::Integrity("expected 1, got 2".to_string());
        assert_eq!(err.to_string(), "Integrity violation: expected 1, got 2");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: HybridError = json_err.into();
        assert!(matches!(err, HybridError::Serialization(_)));
    }

    #[test]
    fn test_result_type_err() {
        let result: Result<i32> = Err(HybridError::Query("failed".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_is_not_found() {
        assert!(HybridError::NotFound("x".to_string()).is_not_found());
        assert!(!HybridError::Validation("x".to_string()).is_not_found());
        assert!(!HybridError::Attribute("x".to_string()).is_not_found());
    }

    #[test]
    fn test_is_fatal() {
        assert!(HybridError::Integrity("x".to_string()).is_fatal());
        assert!(!HybridError::Conflict("x".to_string()).is_fatal());
        assert!(!HybridError::NotFound("x".to_string()).is_fatal());
    }

    #[test]
    fn test_is_constraint_violation() {
        assert!(HybridError::Conflict("test".to_string()).is_constraint_violation());
        assert!(HybridError::ForeignKey("test".to_string()).is_constraint_violation());
        assert!(!HybridError::Timeout("test".to_string()).is_constraint_violation());
        assert!(!HybridError::Query("test".to_string()).is_constraint_violation());
    }
}
