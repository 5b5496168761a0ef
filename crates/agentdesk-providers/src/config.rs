//! Provider configuration
//!
//! Settings are constructed once and handed to adapters and the generation
//! pipeline. A missing API key is not an error here; adapters reject the
//! call when it happens.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kind::ProviderKind;

/// Smallest accepted character limit; leaves room for the truncation marker.
pub const MIN_CHAR_LIMIT: usize = 64;

/// Per-provider endpoint, model and pricing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub cost_per_image: f64,
}

impl ProviderSettings {
    /// Built-in defaults for a provider, without an API key.
    pub fn defaults(kind: ProviderKind) -> Self {
        let (base_url, text_model, image_model) = match kind {
            ProviderKind::OpenAi => ("https://api.openai.com/v1", "gpt-5.2", "gpt-image-1"),
            ProviderKind::Gemini => (
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-3-pro-preview",
                "gemini-3-pro-image-preview",
            ),
        };
        ProviderSettings {
            api_key: None,
            base_url: base_url.to_string(),
            text_model: text_model.to_string(),
            image_model: image_model.to_string(),
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            cost_per_image: 0.0,
        }
    }

    /// API key, treating an empty string as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    fn from_lookup<F>(kind: ProviderKind, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::defaults(kind);
        let text = |suffix: &str, default: String| lookup(&kind.env_var(suffix)).unwrap_or(default);
        Ok(ProviderSettings {
            api_key: lookup(kind.api_key_var()),
            base_url: text("BASE_URL", defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            text_model: text("MODEL_TEXT", defaults.text_model),
            image_model: text("MODEL_IMAGE", defaults.image_model),
            input_cost_per_1k: parse_rate(lookup, &kind.env_var("INPUT_COST_PER_1K"))?,
            output_cost_per_1k: parse_rate(lookup, &kind.env_var("OUTPUT_COST_PER_1K"))?,
            cost_per_image: parse_rate(lookup, &kind.env_var("IMAGE_COST_PER_IMAGE"))?,
        })
    }
}

/// Bounds applied to text generation requests before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationLimits {
    pub text_input_char_limit: usize,
    pub system_prompt_char_limit: usize,
    pub default_max_output_tokens: u32,
    pub hard_max_output_tokens: u32,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        GenerationLimits {
            text_input_char_limit: 12_000,
            system_prompt_char_limit: 4_000,
            default_max_output_tokens: 1_024,
            hard_max_output_tokens: 4_096,
        }
    }
}

impl GenerationLimits {
    /// Create limits, clamping char limits to [`MIN_CHAR_LIMIT`], the hard
    /// max to at least 1, and the default to the hard max.
    pub fn new(
        text_input_char_limit: usize,
        system_prompt_char_limit: usize,
        default_max_output_tokens: u32,
        hard_max_output_tokens: u32,
    ) -> Self {
        let hard_max_output_tokens = hard_max_output_tokens.max(1);
        GenerationLimits {
            text_input_char_limit: text_input_char_limit.max(MIN_CHAR_LIMIT),
            system_prompt_char_limit: system_prompt_char_limit.max(MIN_CHAR_LIMIT),
            default_max_output_tokens: default_max_output_tokens.clamp(1, hard_max_output_tokens),
            hard_max_output_tokens,
        }
    }
}

/// Complete provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub openai: ProviderSettings,
    pub gemini: ProviderSettings,
    pub limits: GenerationLimits,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            openai: ProviderSettings::defaults(ProviderKind::OpenAi),
            gemini: ProviderSettings::defaults(ProviderKind::Gemini),
            limits: GenerationLimits::default(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = GenerationLimits::default();
        let limits = GenerationLimits::new(
            parse_var(&lookup, "AI_TEXT_INPUT_CHAR_LIMIT", defaults.text_input_char_limit)?,
            parse_var(
                &lookup,
                "AI_SYSTEM_PROMPT_CHAR_LIMIT",
                defaults.system_prompt_char_limit,
            )?,
            parse_var(
                &lookup,
                "AI_TEXT_DEFAULT_MAX_OUTPUT_TOKENS",
                defaults.default_max_output_tokens,
            )?,
            parse_var(
                &lookup,
                "AI_TEXT_HARD_MAX_OUTPUT_TOKENS",
                defaults.hard_max_output_tokens,
            )?,
        );
        let timeout_secs: u64 = parse_var(&lookup, "AI_HTTP_TIMEOUT_SECONDS", 60)?;

        Ok(ProviderConfig {
            openai: ProviderSettings::from_lookup(ProviderKind::OpenAi, &lookup)?,
            gemini: ProviderSettings::from_lookup(ProviderKind::Gemini, &lookup)?,
            limits,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    fn settings_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
        }
    }

    /// Set a provider's API key
    pub fn with_api_key(mut self, kind: ProviderKind, key: impl Into<String>) -> Self {
        self.settings_mut(kind).api_key = Some(key.into());
        self
    }

    /// Point a provider at a different base URL (e.g. a mock server)
    pub fn with_base_url(mut self, kind: ProviderKind, url: impl Into<String>) -> Self {
        self.settings_mut(kind).base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_limits(mut self, limits: GenerationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn parse_var<T, F>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            value: raw,
        }),
    }
}

/// Cost rates must be finite and non-negative; unset means free.
fn parse_rate<F>(lookup: &F, var: &str) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let rate: f64 = parse_var(lookup, var, 0.0)?;
    if rate.is_finite() && rate >= 0.0 {
        Ok(rate)
    } else {
        Err(ConfigError::Invalid {
            var: var.to_string(),
            value: lookup(var).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = ProviderConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert!(config.openai.api_key().is_none());
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn reads_provider_settings() {
        let config = ProviderConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:9000/v1/"),
            ("GEMINI_MODEL_TEXT", "gemini-lite"),
            ("GEMINI_INPUT_COST_PER_1K", "0.25"),
            ("AI_HTTP_TIMEOUT_SECONDS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.openai.api_key(), Some("sk-test"));
        assert_eq!(config.openai.base_url, "http://localhost:9000/v1");
        assert_eq!(config.gemini.text_model, "gemini-lite");
        assert_eq!(config.gemini.input_cost_per_1k, 0.25);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config =
            ProviderConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.gemini.api_key().is_none());
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = ProviderConfig::from_lookup(lookup_from(&[("AI_TEXT_HARD_MAX_OUTPUT_TOKENS", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "AI_TEXT_HARD_MAX_OUTPUT_TOKENS".into(),
                value: "lots".into()
            }
        );
    }

    #[test]
    fn negative_or_non_finite_rates_are_rejected() {
        for (var, value) in [
            ("OPENAI_INPUT_COST_PER_1K", "-1"),
            ("GEMINI_OUTPUT_COST_PER_1K", "NaN"),
            ("OPENAI_IMAGE_COST_PER_IMAGE", "inf"),
        ] {
            let err = ProviderConfig::from_lookup(lookup_from(&[(var, value)])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::Invalid {
                    var: var.into(),
                    value: value.into()
                }
            );
        }

        let free = ProviderConfig::from_lookup(lookup_from(&[("OPENAI_INPUT_COST_PER_1K", "0")]))
            .unwrap();
        assert_eq!(free.openai.input_cost_per_1k, 0.0);
    }

    #[test]
    fn limits_are_clamped() {
        let limits = GenerationLimits::new(10, 0, 9_000, 0);
        assert_eq!(limits.text_input_char_limit, MIN_CHAR_LIMIT);
        assert_eq!(limits.system_prompt_char_limit, MIN_CHAR_LIMIT);
        assert_eq!(limits.hard_max_output_tokens, 1);
        assert_eq!(limits.default_max_output_tokens, 1);

        let limits = GenerationLimits::new(100, 100, 2_048, 512);
        assert_eq!(limits.default_max_output_tokens, 512);
    }

    #[test]
    fn builders_override_settings() {
        let config = ProviderConfig::default()
            .with_api_key(ProviderKind::Gemini, "g-key")
            .with_base_url(ProviderKind::Gemini, "http://127.0.0.1:1234/")
            .with_timeout(Duration::from_millis(250));
        assert_eq!(config.settings(ProviderKind::Gemini).api_key(), Some("g-key"));
        assert_eq!(config.gemini.base_url, "http://127.0.0.1:1234");
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn api_key_is_not_serialized() {
        let config = ProviderConfig::default().with_api_key(ProviderKind::OpenAi, "secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
