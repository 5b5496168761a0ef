//! Shared HTTP plumbing for provider adapters

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::kind::ProviderKind;

/// Build a `reqwest` client with the configured timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(concat!("agentdesk-providers/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Client(e.to_string()))
}

/// POST a JSON body and decode a JSON response, classifying every failure.
pub(crate) async fn post_json<B, R>(
    provider: ProviderKind,
    operation: &'static str,
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    if !status.is_success() {
        warn!(
            provider = %provider,
            operation,
            status = status.as_u16(),
            "provider returned an error status"
        );
        return Err(ProviderError::http(provider, operation, status.as_u16(), &text));
    }

    debug!(provider = %provider, operation, bytes = text.len(), "provider response received");
    serde_json::from_str(&text).map_err(|e| {
        ProviderError::InvalidResponse(format!("{} {operation} response: {e}", provider.label()))
    })
}
