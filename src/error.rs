//! Error types for the CRM service.

use std::time::Duration;

/// Top-level error type for the service.
///
/// The flat variants mirror the failure taxonomy surfaced to API callers:
/// each one maps to exactly one HTTP status (see the `IntoResponse` impl
/// in `api`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Still in use: {0}")]
    InUse(String),
}

impl Error {
    /// Shorthand for a NotFound error with a displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
///
/// `Timeout` and `Connection` are kept distinct from `Query` so callers can
/// tell a retryable slow/unreachable database (408/503) apart from a
/// genuine query failure (500).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// Classify a raw libsql error.
    ///
    /// libsql reports SQLite constraint violations and connection failures
    /// through the same error type; we split them on the message because the
    /// HTTP mapping differs (409 vs 503 vs 500).
    pub fn from_libsql(e: libsql::Error) -> Self {
        let msg = e.to_string();
        if msg.contains("UNIQUE constraint failed") || msg.contains("FOREIGN KEY constraint") {
            Self::Constraint(msg)
        } else if msg.contains("unable to open") || msg.contains("connection") {
            Self::Connection(msg)
        } else {
            Self::Query(msg)
        }
    }
}

impl From<libsql::Error> for DatabaseError {
    fn from(e: libsql::Error) -> Self {
        Self::from_libsql(e)
    }
}

impl From<libsql::Error> for Error {
    fn from(e: libsql::Error) -> Self {
        Self::Database(DatabaseError::from_libsql(e))
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message() {
        let err = Error::not_found("Pipeline", "abc-123");
        assert_eq!(err.to_string(), "Pipeline not found: abc-123");
    }

    #[test]
    fn database_error_wraps() {
        let err: Error = DatabaseError::Timeout {
            after: Duration::from_secs(30),
        }
        .into();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::Timeout { .. })
        ));
    }
}
