//! OpenAI adapter (Responses API for text, Images API for images)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{ProviderConfig, ProviderSettings};
use crate::error::ProviderError;
use crate::http::{build_client, post_json};
use crate::kind::ProviderKind;
use crate::pricing::{image_cost, text_cost};
use crate::types::*;
use crate::GenerationProvider;

const IMAGE_MIME_TYPE: &str = "image/png";

/// OpenAI API adapter.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config.timeout)?,
            settings: config.openai.clone(),
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.settings
            .api_key()
            .ok_or(ProviderError::NotConfigured {
                var: ProviderKind::OpenAi.api_key_var(),
            })
    }

    async fn generate_text(&self, job: &TextJob) -> Result<ProviderResult, ProviderError> {
        let key = self.api_key()?;
        let model = job
            .model_override
            .clone()
            .unwrap_or_else(|| self.settings.text_model.clone());

        let mut input = Vec::new();
        if let Some(system) = job.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            input.push(InputMessage::new("system", system));
        }
        input.push(InputMessage::new("user", &job.prompt));
        let request = ResponsesRequest {
            model: &model,
            input,
            temperature: job.temperature,
            max_output_tokens: job.max_output_tokens,
        };

        let url = format!("{}/responses", self.settings.base_url);
        let parsed: ResponsesBody = post_json(
            ProviderKind::OpenAi,
            "text",
            self.client.post(url).bearer_auth(key),
            &request,
        )
        .await?;

        let text = parsed.text();
        let usage = parsed.usage.unwrap_or_default();
        Ok(ProviderResult {
            provider: ProviderKind::OpenAi,
            model_name: model,
            payload: GeneratedPayload::Text { text },
            token_input_count: usage.input_tokens,
            token_output_count: usage.output_tokens,
            cost_usd: text_cost(&self.settings, usage.input_tokens, usage.output_tokens),
        })
    }

    async fn generate_image(&self, job: &ImageJob) -> Result<ProviderResult, ProviderError> {
        let key = self.api_key()?;
        let model = job
            .model_override
            .clone()
            .unwrap_or_else(|| self.settings.image_model.clone());

        let mut request = json!({ "model": model, "prompt": job.prompt });
        if let Some(size) = job.size.as_deref().filter(|s| !s.is_empty()) {
            request["size"] = Value::from(size);
        }

        let url = format!("{}/images/generations", self.settings.base_url);
        let parsed: ImagesBody = post_json(
            ProviderKind::OpenAi,
            "image",
            self.client.post(url).bearer_auth(key),
            &request,
        )
        .await?;

        let item = parsed.data.into_iter().next().unwrap_or_default();
        let b64_json = item.b64_json.filter(|s| !s.trim().is_empty());
        let url = item.url.filter(|s| !s.trim().is_empty());
        if b64_json.is_none() && url.is_none() {
            return Err(ProviderError::MissingField(
                "OpenAI image response did not include b64_json or url".to_string(),
            ));
        }
        Ok(ProviderResult {
            provider: ProviderKind::OpenAi,
            model_name: model,
            payload: GeneratedPayload::Image {
                mime_type: Some(IMAGE_MIME_TYPE.to_string()),
                image_base64: b64_json,
                image_url: url,
            },
            token_input_count: None,
            token_output_count: None,
            cost_usd: image_cost(&self.settings),
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(&self, job: &GenerationJob) -> Result<ProviderResult, ProviderError> {
        match job {
            GenerationJob::Text(text) => self.generate_text(text).await,
            GenerationJob::Image(image) => self.generate_image(image).await,
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: [InputText<'a>; 1],
}

impl<'a> InputMessage<'a> {
    fn new(role: &'static str, text: &'a str) -> Self {
        Self {
            role,
            content: [InputText {
                kind: "input_text",
                text,
            }],
        }
    }
}

#[derive(Serialize)]
struct InputText<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct ResponsesBody {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

impl ResponsesBody {
    /// `output_text` when present, else the text parts of the first output
    /// item that has any, joined by newlines.
    fn text(&self) -> String {
        if let Some(text) = self.output_text.as_deref().filter(|t| !t.is_empty()) {
            return text.to_string();
        }
        self.output
            .iter()
            .map(|item| {
                item.content
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .find(|parts| !parts.is_empty())
            .map(|parts| parts.join("\n").trim().to_string())
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Default)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize, Default)]
struct OutputContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: Option<i64>,
    #[serde(default)]
    output_tokens: Option<i64>,
}

#[derive(Deserialize, Default)]
struct ImagesBody {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize, Default)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}
