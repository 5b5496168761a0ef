//! Request and result types shared by every adapter

use serde::{Deserialize, Serialize};

use crate::kind::ProviderKind;

/// A normalized text generation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextJob {
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Overrides the provider's configured text model.
    pub model_override: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

/// An image generation request. Passed to providers as received.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageJob {
    pub prompt: String,
    pub size: Option<String>,
    /// Overrides the provider's configured image model.
    pub model_override: Option<String>,
}

/// Work handed to a [`crate::GenerationProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GenerationJob {
    Text(TextJob),
    Image(ImageJob),
}

impl GenerationJob {
    pub fn model_override(&self) -> Option<&str> {
        match self {
            GenerationJob::Text(job) => job.model_override.as_deref(),
            GenerationJob::Image(job) => job.model_override.as_deref(),
        }
    }

    /// Short label for logs and spans.
    pub fn kind_label(&self) -> &'static str {
        match self {
            GenerationJob::Text(_) => "text",
            GenerationJob::Image(_) => "image",
        }
    }
}

/// Generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratedPayload {
    Text {
        text: String,
    },
    Image {
        mime_type: Option<String>,
        image_base64: Option<String>,
        image_url: Option<String>,
    },
}

impl GeneratedPayload {
    pub fn text(&self) -> Option<&str> {
        match self {
            GeneratedPayload::Text { text } => Some(text),
            GeneratedPayload::Image { .. } => None,
        }
    }
}

/// A provider's response, unified across vendors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: ProviderKind,
    pub model_name: String,
    pub payload: GeneratedPayload,
    pub token_input_count: Option<i64>,
    pub token_output_count: Option<i64>,
    pub cost_usd: f64,
}
