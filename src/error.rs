//! Error types for the datastore.
//!
//! Driver and migration errors are carried through unchanged so callers see
//! exactly the message produced by the collaborator. The remaining variants
//! cover outcomes this layer produces itself: context cancellation, deadlines
//! and configuration values that cannot be interpreted.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error raised by the SQL driver (connection, ping, statement, decode).
    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    /// Error raised by the migration engine.
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded: {operation}")]
    DeadlineExceeded { operation: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl DbError {
    /// Create a deadline error for the named operation.
    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// True when the driver reported that a single-row query matched nothing.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::Driver(sqlx::Error::RowNotFound))
    }

    /// True for errors raised while establishing or holding a connection.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Driver(
                sqlx::Error::Configuration(_)
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
            )
        )
    }

    /// True when the error came from a cancellation context rather than the driver.
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded { .. })
    }
}

/// Result type alias for datastore operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_message_is_unwrapped() {
        let err = DbError::from(sqlx::Error::Protocol("bad handshake".to_string()));
        assert_eq!(
            err.to_string(),
            sqlx::Error::Protocol("bad handshake".to_string()).to_string()
        );
    }

    #[test]
    fn test_no_rows_detection() {
        assert!(DbError::from(sqlx::Error::RowNotFound).is_no_rows());
        assert!(!DbError::Cancelled.is_no_rows());
    }

    #[test]
    fn test_connection_classification() {
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_connection());
        assert!(DbError::from(sqlx::Error::PoolClosed).is_connection());
        assert!(!DbError::from(sqlx::Error::RowNotFound).is_connection());
        assert!(!DbError::Cancelled.is_connection());
    }

    #[test]
    fn test_context_errors() {
        assert!(DbError::Cancelled.is_context());
        let err = DbError::deadline_exceeded("query");
        assert!(err.is_context());
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = DbError::invalid_config("bad duration");
        assert!(err.to_string().contains("Invalid configuration"));
        assert!(err.to_string().contains("bad duration"));
    }
}
