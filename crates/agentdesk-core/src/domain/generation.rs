//! Inbound generation requests and their responses.

use agentdesk_providers::ProviderKind;
use agentdesk_state::RunId;
use serde::{Deserialize, Serialize};

use super::error::{DeskError, Result};

pub const PROMPT_MAX_CHARS: usize = 40_000;
pub const MAX_OUTPUT_TOKENS_LIMIT: u32 = 16_384;
pub const TEMPERATURE_MAX: f64 = 2.0;
pub const IMAGE_SIZE_MAX_CHARS: usize = 30;
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

fn default_preference() -> String {
    "auto".to_string()
}

fn default_image_size() -> Option<String> {
    Some(DEFAULT_IMAGE_SIZE.to_string())
}

/// A text generation request as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationRequest {
    pub project_id: i64,
    /// Explicit agent; when absent one is resolved from the project.
    #[serde(default)]
    pub agent_id: Option<i64>,
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub stage_id: Option<i64>,
    #[serde(default = "default_preference")]
    pub provider_preference: String,
    /// Model override passed to whichever provider is tried.
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl TextGenerationRequest {
    pub fn new(project_id: i64, prompt: impl Into<String>) -> Self {
        Self {
            project_id,
            agent_id: None,
            prompt: prompt.into(),
            system_prompt: None,
            stage_id: None,
            provider_preference: default_preference(),
            model_name: None,
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_prompt(&self.prompt)?;
        if let Some(temperature) = self.temperature {
            if !(0.0..=TEMPERATURE_MAX).contains(&temperature) {
                return Err(DeskError::validation(format!(
                    "temperature must be between 0 and {TEMPERATURE_MAX}"
                )));
            }
        }
        if let Some(tokens) = self.max_output_tokens {
            if !(1..=MAX_OUTPUT_TOKENS_LIMIT).contains(&tokens) {
                return Err(DeskError::validation(format!(
                    "max_output_tokens must be between 1 and {MAX_OUTPUT_TOKENS_LIMIT}"
                )));
            }
        }
        Ok(())
    }
}

/// An image generation request as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub project_id: i64,
    #[serde(default)]
    pub agent_id: Option<i64>,
    pub prompt: String,
    #[serde(default)]
    pub stage_id: Option<i64>,
    #[serde(default = "default_preference")]
    pub provider_preference: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_image_size")]
    pub size: Option<String>,
}

impl ImageGenerationRequest {
    pub fn new(project_id: i64, prompt: impl Into<String>) -> Self {
        Self {
            project_id,
            agent_id: None,
            prompt: prompt.into(),
            stage_id: None,
            provider_preference: default_preference(),
            model_name: None,
            size: default_image_size(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_prompt(&self.prompt)?;
        if let Some(size) = &self.size {
            if size.chars().count() > IMAGE_SIZE_MAX_CHARS {
                return Err(DeskError::validation(format!(
                    "size must be at most {IMAGE_SIZE_MAX_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}

fn validate_prompt(prompt: &str) -> Result<()> {
    let len = prompt.chars().count();
    if len == 0 || len > PROMPT_MAX_CHARS {
        return Err(DeskError::validation(format!(
            "prompt must be between 1 and {PROMPT_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationResponse {
    pub run_id: RunId,
    pub provider: ProviderKind,
    pub model_name: String,
    pub text: String,
    pub token_input_count: Option<i64>,
    pub token_output_count: Option<i64>,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    pub run_id: RunId,
    pub provider: ProviderKind,
    pub model_name: String,
    pub mime_type: Option<String>,
    pub image_base64: Option<String>,
    pub image_url: Option<String>,
    pub cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_request_bounds() {
        let mut req = TextGenerationRequest::new(1, "hello");
        assert!(req.validate().is_ok());

        req.temperature = Some(2.5);
        assert!(req.validate().is_err());
        req.temperature = Some(2.0);
        assert!(req.validate().is_ok());

        req.max_output_tokens = Some(0);
        assert!(req.validate().is_err());
        req.max_output_tokens = Some(MAX_OUTPUT_TOKENS_LIMIT + 1);
        assert!(req.validate().is_err());
        req.max_output_tokens = Some(MAX_OUTPUT_TOKENS_LIMIT);
        assert!(req.validate().is_ok());

        req.prompt = String::new();
        assert!(req.validate().is_err());
        req.prompt = "x".repeat(PROMPT_MAX_CHARS + 1);
        assert!(req.validate().is_err());
    }

    #[test]
    fn image_request_defaults_and_size_bound() {
        let req: ImageGenerationRequest =
            serde_json::from_str(r#"{"project_id": 3, "prompt": "a fox"}"#).unwrap();
        assert_eq!(req.size.as_deref(), Some(DEFAULT_IMAGE_SIZE));
        assert_eq!(req.provider_preference, "auto");
        assert!(req.validate().is_ok());

        let req = ImageGenerationRequest {
            size: Some("9".repeat(IMAGE_SIZE_MAX_CHARS + 1)),
            ..ImageGenerationRequest::new(3, "a fox")
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn text_request_deserializes_with_defaults() {
        let req: TextGenerationRequest =
            serde_json::from_str(r#"{"project_id": 1, "prompt": "hi"}"#).unwrap();
        assert_eq!(req, TextGenerationRequest::new(1, "hi"));
    }
}
