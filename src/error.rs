//! Error types for fluent-sql.

use thiserror::Error;

/// An error reported by the database engine itself.
///
/// Carries the SQLSTATE code and, for integrity violations, the name of the
/// violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DatabaseError {
    /// SQLSTATE code, e.g. `23505` for a unique violation.
    pub code: Option<String>,
    /// Primary message from the server.
    pub message: String,
    /// Name of the violated constraint, if any.
    pub constraint: Option<String>,
    /// Optional detail line from the server.
    pub detail: Option<String>,
}

impl DatabaseError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            constraint: None,
            detail: None,
        }
    }

    /// Attach a SQLSTATE code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the violated constraint name.
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }
}

/// Failure while extracting a typed value from a [`crate::row::Row`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// The result schema has no column with this name.
    #[error("Column not found: '{0}'")]
    ColumnNotFound(String),

    /// Ordinal outside the row.
    #[error("Column ordinal {ordinal} out of range (row has {len} columns)")]
    OrdinalOutOfRange { ordinal: usize, len: usize },

    /// A non-optional getter met a database NULL.
    #[error("Column '{0}' is NULL")]
    UnexpectedNull(String),

    /// The stored value cannot be read as the requested type.
    #[error("Column '{column}' holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised by a driver implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Engine-level error (syntax, constraint, type mismatch...).
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Transport or connection-level failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A column value could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A composite type name is unknown to the server.
    #[error("Unknown SQL type: '{0}'")]
    UnknownType(String),

    /// The row consumer rejected a row.
    #[error(transparent)]
    Row(#[from] RowError),
}

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// The main error type returned by command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Caller misuse: negative timeout, duplicate constraint registration,
    /// missing command mode, missing cursor name.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A registered constraint was violated; `source` is the error the caller
    /// registered for it.
    #[error("Constraint '{constraint}' violated: {source}")]
    ConstraintViolation {
        constraint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other engine-reported execution error, unchanged.
    #[error("Command execution failed: {0}")]
    CommandExecutionFailed(#[source] DatabaseError),

    /// A blocking `exec_*` method was called on a thread already running an
    /// async runtime.
    #[error("Blocking exec_* called inside an async runtime; use the _async variant")]
    BlockingInRuntime,

    /// Failure below the engine (connect, I/O, decode).
    #[error(transparent)]
    Driver(DriverError),

    /// The item builder could not read a row.
    #[error("Row error: {0}")]
    Row(#[from] RowError),
}

impl CommandError {
    /// Create an invalid configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// The registered error for a constraint violation, if it has type `E`.
    pub fn violation<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::ConstraintViolation { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Name of the violated constraint, whether it was remapped or not.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            Self::ConstraintViolation { constraint, .. } => Some(constraint),
            Self::CommandExecutionFailed(db) => db.constraint.as_deref(),
            _ => None,
        }
    }

    /// The engine error, when the failure was not remapped.
    pub fn database_error(&self) -> Option<&DatabaseError> {
        match self {
            Self::CommandExecutionFailed(db) => Some(db),
            _ => None,
        }
    }
}

/// Result type alias for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("email already registered")]
    struct DuplicateEmail;

    #[test]
    fn test_error_display() {
        let err = CommandError::config("timeout must be >= 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: timeout must be >= 0"
        );

        let err = RowError::TypeMismatch {
            column: "id".into(),
            expected: "integer",
            found: "text",
        };
        assert_eq!(err.to_string(), "Column 'id' holds text, expected integer");
    }

    #[test]
    fn test_violation_downcast() {
        let err = CommandError::ConstraintViolation {
            constraint: "uq_email".into(),
            source: Box::new(DuplicateEmail),
        };
        assert!(err.violation::<DuplicateEmail>().is_some());
        assert!(err.violation::<std::fmt::Error>().is_none());
        assert_eq!(err.constraint(), Some("uq_email"));
        assert_eq!(
            err.to_string(),
            "Constraint 'uq_email' violated: email already registered"
        );
    }

    #[test]
    fn test_unmapped_constraint_is_visible() {
        let db = DatabaseError::new("duplicate key")
            .with_code("23505")
            .with_constraint("uq_login");
        let err = CommandError::CommandExecutionFailed(db);
        assert_eq!(err.constraint(), Some("uq_login"));
        assert_eq!(err.database_error().and_then(|d| d.code.as_deref()), Some("23505"));
    }
}
