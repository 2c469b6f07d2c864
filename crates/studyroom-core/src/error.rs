//! Core error types for studyroom-core.
//!
//! The session engine reports its own failures through [`SessionError`];
//! persistence collaborators report through [`StoreError`]. Everything folds
//! into [`CoreError`] for callers that do not care about the distinction.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for studyroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session engine errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Persistence collaborator errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the study session engine.
///
/// `InvalidConfig`, `SessionAlreadyActive` and `NoActiveSession` are caller
/// sequencing errors and are never retried.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session config for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    #[error("A session is already active")]
    SessionAlreadyActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] StoreError),
}

impl SessionError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        SessionError::InvalidConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::PersistenceFailure(err)
    }
}

/// Errors from a [`crate::storage::SessionStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Record with the given id does not exist
    #[error("Session record not found: {0}")]
    NotFound(String),

    /// Store rejected the write (offline, quota, injected failure)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.into())
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored value could not be decoded
    #[error("Corrupt row in '{table}': {message}")]
    CorruptRow { table: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_becomes_persistence_failure() {
        let err: SessionError = StoreError::Unavailable("offline".into()).into();
        assert!(matches!(err, SessionError::PersistenceFailure(_)));
        assert_eq!(err.to_string(), "Persistence failure: Store unavailable: offline");
    }

    #[test]
    fn invalid_config_names_the_field() {
        let err = SessionError::invalid("work_minutes", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Invalid session config for 'work_minutes': must be greater than zero"
        );
    }

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let raw = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        let mapped: DatabaseError = raw.into();
        assert!(matches!(mapped, DatabaseError::Locked));
    }
}
