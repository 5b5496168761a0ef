//! Domain-level error taxonomy for AgentDesk.

use agentdesk_providers::{ConfigError, ProviderError};
use agentdesk_state::{RunId, StorageError};
use serde::Serialize;

/// Client-facing classification of a [`DeskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    ServiceUnavailable,
    Internal,
}

impl ErrorClass {
    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorClass::BadRequest => 400,
            ErrorClass::Forbidden => 403,
            ErrorClass::NotFound => 404,
            ErrorClass::Conflict => 409,
            ErrorClass::ServiceUnavailable => 503,
            ErrorClass::Internal => 500,
        }
    }
}

/// AgentDesk domain errors.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    /// A required precondition does not hold (e.g. no active agent).
    #[error("{0}")]
    Precondition(String),

    /// Every provider failed; a failed run was recorded as `run_id`.
    #[error("All providers failed. run_id={run_id}. errors={}", .errors.join(" | "))]
    GenerationFailed {
        run_id: RunId,
        all_upstream: bool,
        errors: Vec<String>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DeskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DeskError::Validation(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DeskError::Validation(_) | DeskError::Precondition(_) => ErrorClass::BadRequest,
            DeskError::NotFound(_) => ErrorClass::NotFound,
            DeskError::Forbidden(_) => ErrorClass::Forbidden,
            DeskError::Conflict(_) => ErrorClass::Conflict,
            DeskError::GenerationFailed { all_upstream, .. } => {
                if *all_upstream {
                    ErrorClass::ServiceUnavailable
                } else {
                    ErrorClass::BadRequest
                }
            }
            DeskError::Storage(err) => match err {
                StorageError::NotFound { .. } => ErrorClass::NotFound,
                StorageError::Conflict(_) => ErrorClass::Conflict,
                StorageError::InvalidField { .. } | StorageError::Rejected(_) => {
                    ErrorClass::BadRequest
                }
                StorageError::Serialization(_) | StorageError::Backend(_) => ErrorClass::Internal,
            },
            DeskError::Provider(err) => {
                if err.is_upstream() {
                    ErrorClass::ServiceUnavailable
                } else {
                    ErrorClass::BadRequest
                }
            }
            DeskError::Config(_) => ErrorClass::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.class().status_code()
    }
}

/// Result type for AgentDesk domain operations.
pub type Result<T> = std::result::Result<T, DeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_keep_their_class() {
        let err = DeskError::from(StorageError::not_found("agent", 7));
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert_eq!(err.status_code(), 404);

        let err = DeskError::from(StorageError::Conflict("duplicate key".into()));
        assert_eq!(err.class(), ErrorClass::Conflict);

        let err = DeskError::from(StorageError::invalid("run_status", "bogus"));
        assert_eq!(err.class(), ErrorClass::BadRequest);

        let err = DeskError::from(StorageError::Backend("socket closed".into()));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn generation_failure_class_follows_upstream_flag() {
        let upstream = DeskError::GenerationFailed {
            run_id: RunId(12),
            all_upstream: true,
            errors: vec!["openai: down".into(), "gemini: down".into()],
        };
        assert_eq!(upstream.class(), ErrorClass::ServiceUnavailable);
        assert_eq!(
            upstream.to_string(),
            "All providers failed. run_id=12. errors=openai: down | gemini: down"
        );

        let mixed = DeskError::GenerationFailed {
            run_id: RunId(13),
            all_upstream: false,
            errors: vec!["openai: OPENAI_API_KEY is not configured".into()],
        };
        assert_eq!(mixed.status_code(), 400);
    }

    #[test]
    fn precondition_is_bad_request() {
        let err = DeskError::Precondition("No active agent available.".into());
        assert_eq!(err.class(), ErrorClass::BadRequest);
    }
}
