//! Provider identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The upstream generation services AgentDesk knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    /// Every registered provider, in ascending lexical order of identifier.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Gemini, ProviderKind::OpenAi];

    /// Fixed priority used for the `auto` preference.
    pub const AUTO_ORDER: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Gemini];

    /// Stable lowercase identifier, as stored in the run ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Human-facing label used in upstream error details.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Gemini => "Gemini",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::Gemini => "GEMINI",
        }
    }

    /// Name of a provider-scoped environment variable, e.g. `GEMINI_BASE_URL`.
    pub fn env_var(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix(), suffix)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_lexically_sorted() {
        let names: Vec<&str> = ProviderKind::ALL.iter().map(|k| k.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn parses_identifiers_and_rejects_unknown() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn serde_uses_identifier() {
        let json = serde_json::to_string(&ProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }

    #[test]
    fn env_vars_are_provider_scoped() {
        assert_eq!(ProviderKind::Gemini.env_var("BASE_URL"), "GEMINI_BASE_URL");
        assert_eq!(ProviderKind::OpenAi.api_key_var(), "OPENAI_API_KEY");
    }
}
