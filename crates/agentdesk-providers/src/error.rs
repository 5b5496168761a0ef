//! Error types for agentdesk-providers

use thiserror::Error;

use crate::kind::ProviderKind;

/// Maximum number of characters of an upstream error body kept in
/// [`ProviderError::Http`].
pub const ERROR_BODY_MAX_CHARS: usize = 300;

/// Errors raised while reading provider configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An environment variable is present but cannot be parsed
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: String, value: String },
}

/// Errors that can occur while calling an upstream provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider's API key is not set
    #[error("{var} is not configured")]
    NotConfigured { var: &'static str },

    /// The request exceeded the configured HTTP timeout
    #[error("{} timeout: request exceeded the configured provider timeout.", .provider.label())]
    Timeout { provider: ProviderKind },

    /// The request never produced an HTTP response
    #[error("{} connectivity error: {message}", .provider.label())]
    Connectivity {
        provider: ProviderKind,
        message: String,
    },

    /// The provider answered with a 4xx/5xx status
    #[error("{} {operation} call failed: {status} {body}", .provider.label())]
    Http {
        provider: ProviderKind,
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// A successful response lacked data the caller needs
    #[error("{0}")]
    MissingField(String),

    /// A successful response could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An identifier that names no registered provider
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// Build an [`ProviderError::Http`], keeping at most
    /// [`ERROR_BODY_MAX_CHARS`] of the response body.
    pub fn http(
        provider: ProviderKind,
        operation: &'static str,
        status: u16,
        body: &str,
    ) -> Self {
        ProviderError::Http {
            provider,
            operation,
            status,
            body: body.chars().take(ERROR_BODY_MAX_CHARS).collect(),
        }
    }

    /// Translate a transport-level `reqwest` failure.
    pub fn transport(provider: ProviderKind, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout { provider }
        } else {
            ProviderError::Connectivity {
                provider,
                message: err.to_string(),
            }
        }
    }

    /// Whether the failure points at the upstream service rather than the
    /// caller: timeouts, connectivity failures, and HTTP 408/429/5xx.
    pub fn is_upstream(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } | ProviderError::Connectivity { .. } => true,
            ProviderError::Http { status, .. } => is_upstream_status(*status),
            ProviderError::NotConfigured { .. }
            | ProviderError::MissingField(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::UnknownProvider(_)
            | ProviderError::Client(_) => false,
        }
    }
}

/// Status codes treated as transient upstream unavailability.
pub fn is_upstream_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_statuses() {
        assert!(is_upstream_status(408));
        assert!(is_upstream_status(429));
        assert!(is_upstream_status(500));
        assert!(is_upstream_status(503));
        assert!(!is_upstream_status(400));
        assert!(!is_upstream_status(401));
        assert!(!is_upstream_status(404));
    }

    #[test]
    fn classification_by_variant() {
        assert!(ProviderError::Timeout {
            provider: ProviderKind::OpenAi
        }
        .is_upstream());
        assert!(!ProviderError::NotConfigured {
            var: "OPENAI_API_KEY"
        }
        .is_upstream());
        assert!(!ProviderError::MissingField("x".into()).is_upstream());
        assert!(!ProviderError::http(ProviderKind::Gemini, "text", 400, "bad").is_upstream());
        assert!(ProviderError::http(ProviderKind::Gemini, "text", 502, "bad gateway").is_upstream());
    }

    #[test]
    fn http_error_body_is_bounded() {
        let body = "é".repeat(1000);
        let err = ProviderError::http(ProviderKind::OpenAi, "text", 500, &body);
        match &err {
            ProviderError::Http { body, .. } => assert_eq!(body.chars().count(), ERROR_BODY_MAX_CHARS),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.to_string().starts_with("OpenAI text call failed: 500 "));
    }

    #[test]
    fn missing_key_message() {
        let err = ProviderError::NotConfigured {
            var: "GEMINI_API_KEY",
        };
        assert_eq!(err.to_string(), "GEMINI_API_KEY is not configured");
    }
}
