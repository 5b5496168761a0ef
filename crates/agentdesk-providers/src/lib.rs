//! AgentDesk Providers: upstream text/image generation services
//!
//! This crate wraps the two supported generation APIs behind one
//! [`GenerationProvider`] trait. Adapters receive an explicitly constructed
//! [`ProviderConfig`]; nothing is read from globals at call time.
//!
//! ## Key Components
//!
//! - `OpenAiAdapter`: Responses API (bearer auth) and Images API
//! - `GeminiAdapter`: `generateContent` (API key as query parameter)
//! - `pricing`: deterministic cost estimates from configured rates
//! - `fakes`: scripted providers for pipeline tests

use std::sync::Arc;

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod fakes;
pub mod gemini;
mod http;
pub mod kind;
pub mod openai;
pub mod pricing;
pub mod types;

pub use config::{GenerationLimits, ProviderConfig, ProviderSettings, MIN_CHAR_LIMIT};
pub use error::{is_upstream_status, ConfigError, ProviderError, ERROR_BODY_MAX_CHARS};
pub use gemini::GeminiAdapter;
pub use kind::ProviderKind;
pub use openai::OpenAiAdapter;
pub use types::{GeneratedPayload, GenerationJob, ImageJob, ProviderResult, TextJob};

/// Result type for agentdesk-providers operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// A text/image generation backend.
///
/// One call is one attempt: implementations must not retry internally.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn generate(&self, job: &GenerationJob) -> Result<ProviderResult>;
}

/// Build the real adapter for every registered provider.
pub fn default_providers(config: &ProviderConfig) -> Result<Vec<Arc<dyn GenerationProvider>>> {
    Ok(vec![
        Arc::new(OpenAiAdapter::new(config)?) as Arc<dyn GenerationProvider>,
        Arc::new(GeminiAdapter::new(config)?),
    ])
}
