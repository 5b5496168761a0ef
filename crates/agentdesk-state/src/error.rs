//! Error types for agentdesk-state

use thiserror::Error;

/// Errors raised while connecting to or initializing the store.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Connection settings are incomplete
    #[error("Invalid database configuration: {0}")]
    Config(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No row with the given identity exists.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique constraint or relational rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A field failed validation before it reached the store.
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A domain rule rejected the mutation (e.g. removing the last admin).
    #[error("{0}")]
    Rejected(String),

    /// Structured payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend failure (connection, query, or unexpected row shape).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        StorageError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        classify_backend_message(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Unique-index violations surface as "Database index `x` already contains ...".
pub(crate) fn classify_backend_message(message: String) -> StorageError {
    if message.contains("already contains") || message.contains("already exists") {
        StorageError::Conflict(message)
    } else {
        StorageError::Backend(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_index_message_is_conflict() {
        let err = classify_backend_message(
            "Database index `idx_project_key` already contains 'alpha', with record `projects:x`"
                .to_string(),
        );
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn other_backend_message_is_backend() {
        let err = classify_backend_message("connection reset".to_string());
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[test]
    fn not_found_display() {
        let err = StorageError::not_found("agent run", 42);
        assert_eq!(err.to_string(), "agent run not found: 42");
    }
}
