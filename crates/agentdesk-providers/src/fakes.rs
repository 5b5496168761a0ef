//! Scripted providers for tests
//!
//! A [`ScriptedProvider`] returns a fixed outcome for every call and counts
//! how many times it was invoked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::kind::ProviderKind;
use crate::types::*;
use crate::GenerationProvider;

/// A provider whose response is fixed up front.
#[derive(Debug)]
pub struct ScriptedProvider {
    kind: ProviderKind,
    outcome: Result<ProviderResult, ProviderError>,
    calls: AtomicUsize,
    jobs: Mutex<Vec<GenerationJob>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind, outcome: Result<ProviderResult, ProviderError>) -> Self {
        Self {
            kind,
            outcome,
            calls: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds with the given text and token counts.
    pub fn text(kind: ProviderKind, text: &str, input: i64, output: i64) -> Self {
        Self::new(
            kind,
            Ok(ProviderResult {
                provider: kind,
                model_name: format!("{kind}-test-model"),
                payload: GeneratedPayload::Text {
                    text: text.to_string(),
                },
                token_input_count: Some(input),
                token_output_count: Some(output),
                cost_usd: 0.0,
            }),
        )
    }

    /// Succeeds with an inline base64 image.
    pub fn image(kind: ProviderKind, image_base64: &str) -> Self {
        Self::new(
            kind,
            Ok(ProviderResult {
                provider: kind,
                model_name: format!("{kind}-image-model"),
                payload: GeneratedPayload::Image {
                    mime_type: Some("image/png".to_string()),
                    image_base64: Some(image_base64.to_string()),
                    image_url: None,
                },
                token_input_count: None,
                token_output_count: None,
                cost_usd: 0.04,
            }),
        )
    }

    /// Fails every call with `error`.
    pub fn failing(kind: ProviderKind, error: ProviderError) -> Self {
        Self::new(kind, Err(error))
    }

    /// Number of times `generate` was called.
    pub fn invocations(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Jobs received so far, in call order.
    pub fn jobs(&self) -> Vec<GenerationJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn generate(&self, job: &GenerationJob) -> Result<ProviderResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().push(job.clone());
        self.outcome.clone()
    }
}
