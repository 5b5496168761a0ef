//! Gemini adapter (`generateContent` for both text and images)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderSettings};
use crate::error::ProviderError;
use crate::http::{build_client, post_json};
use crate::kind::ProviderKind;
use crate::pricing::{image_cost, text_cost};
use crate::types::*;
use crate::GenerationProvider;

/// Gemini API adapter. The key travels as a `key` query parameter.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    settings: ProviderSettings,
}

impl GeminiAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config.timeout)?,
            settings: config.gemini.clone(),
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.settings
            .api_key()
            .ok_or(ProviderError::NotConfigured {
                var: ProviderKind::Gemini.api_key_var(),
            })
    }

    async fn call(
        &self,
        operation: &'static str,
        model: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentBody, ProviderError> {
        let key = self.api_key()?;
        let url = format!("{}/models/{model}:generateContent", self.settings.base_url);
        post_json(
            ProviderKind::Gemini,
            operation,
            self.client.post(url).query(&[("key", key)]),
            request,
        )
        .await
    }

    async fn generate_text(&self, job: &TextJob) -> Result<ProviderResult, ProviderError> {
        let model = job
            .model_override
            .clone()
            .unwrap_or_else(|| self.settings.text_model.clone());

        let generation_config = if job.max_output_tokens.is_some() || job.temperature.is_some() {
            Some(GenerationConfig {
                max_output_tokens: job.max_output_tokens,
                temperature: job.temperature,
                response_modalities: None,
            })
        } else {
            None
        };
        let request = GenerateContentRequest {
            contents: vec![Content::text(&job.prompt)],
            system_instruction: job
                .system_prompt
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(Content::text),
            generation_config,
        };

        let parsed = self.call("text", &model, &request).await?;
        let text = parsed
            .first_parts()
            .iter()
            .filter_map(|part| part.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        let usage = parsed.usage_metadata.unwrap_or_default();

        Ok(ProviderResult {
            provider: ProviderKind::Gemini,
            model_name: model,
            payload: GeneratedPayload::Text { text },
            token_input_count: usage.prompt_token_count,
            token_output_count: usage.candidates_token_count,
            cost_usd: text_cost(
                &self.settings,
                usage.prompt_token_count,
                usage.candidates_token_count,
            ),
        })
    }

    async fn generate_image(&self, job: &ImageJob) -> Result<ProviderResult, ProviderError> {
        let model = job
            .model_override
            .clone()
            .unwrap_or_else(|| self.settings.image_model.clone());
        let request = GenerateContentRequest {
            contents: vec![Content::text(&job.prompt)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                max_output_tokens: None,
                temperature: None,
                response_modalities: Some(&["IMAGE", "TEXT"]),
            }),
        };

        let parsed = self.call("image", &model, &request).await?;
        let inline = parsed
            .first_parts()
            .iter()
            .filter_map(|part| part.inline_data.clone())
            .find(|inline| inline.data.as_deref().is_some_and(|d| !d.trim().is_empty()))
            .ok_or_else(|| {
                ProviderError::MissingField(
                    "Gemini image response did not include inlineData with image data".to_string(),
                )
            })?;

        Ok(ProviderResult {
            provider: ProviderKind::Gemini,
            model_name: model,
            payload: GeneratedPayload::Image {
                mime_type: inline.mime_type,
                image_base64: inline.data,
                image_url: None,
            },
            token_input_count: None,
            token_output_count: None,
            cost_usd: image_cost(&self.settings),
        })
    }
}

#[async_trait]
impl GenerationProvider for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

impl<'a> Content<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            parts: [TextPart { text }],
        }
    }
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<&'static [&'static str]>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentBody {
    fn first_parts(&self) -> &[ResponsePart] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<i64>,
    #[serde(default)]
    candidates_token_count: Option<i64>,
}
