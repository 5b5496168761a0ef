//! Provider ordering policy.

use agentdesk_providers::ProviderKind;

use crate::domain::{DeskError, Result};

pub const AUTO_PREFERENCE: &str = "auto";

/// Providers to try, in order, for a preference string.
///
/// A known provider goes first, followed by the rest in lexical order.
/// `auto` uses the fixed priority in [`ProviderKind::AUTO_ORDER`]. Matching
/// ignores case and surrounding whitespace.
pub fn provider_order(preference: &str) -> Result<Vec<ProviderKind>> {
    let pref = preference.trim().to_lowercase();
    if pref == AUTO_PREFERENCE {
        return Ok(ProviderKind::AUTO_ORDER.to_vec());
    }
    match pref.parse::<ProviderKind>() {
        Ok(first) => {
            let mut order = vec![first];
            order.extend(ProviderKind::ALL.iter().copied().filter(|k| *k != first));
            Ok(order)
        }
        Err(_) => Err(DeskError::validation(format!(
            "provider_preference must be one of: {}",
            accepted_preferences().join(", ")
        ))),
    }
}

fn accepted_preferences() -> Vec<&'static str> {
    std::iter::once(AUTO_PREFERENCE)
        .chain(ProviderKind::AUTO_ORDER.iter().map(|k| k.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorClass;
    use std::collections::HashSet;

    #[test]
    fn explicit_provider_goes_first() {
        assert_eq!(
            provider_order("gemini").unwrap(),
            vec![ProviderKind::Gemini, ProviderKind::OpenAi]
        );
        assert_eq!(
            provider_order("openai").unwrap(),
            vec![ProviderKind::OpenAi, ProviderKind::Gemini]
        );
    }

    #[test]
    fn auto_uses_fixed_priority() {
        assert_eq!(
            provider_order("auto").unwrap(),
            vec![ProviderKind::OpenAi, ProviderKind::Gemini]
        );
    }

    #[test]
    fn case_and_whitespace_are_ignored() {
        assert_eq!(provider_order("  GeMiNi\n").unwrap()[0], ProviderKind::Gemini);
        assert_eq!(provider_order(" AUTO ").unwrap()[0], ProviderKind::OpenAi);
    }

    #[test]
    fn unknown_preferences_are_rejected() {
        for bad in ["", "anthropic", "open ai", "openai,gemini", "automatic"] {
            let err = provider_order(bad).unwrap_err();
            assert_eq!(err.class(), ErrorClass::BadRequest, "{bad:?}");
            assert_eq!(
                err.to_string(),
                "provider_preference must be one of: auto, openai, gemini"
            );
        }
    }

    #[test]
    fn every_valid_order_is_a_permutation() {
        let all: HashSet<ProviderKind> = ProviderKind::ALL.iter().copied().collect();
        for pref in ["auto", "openai", "gemini", "OpenAI", " gemini "] {
            let order = provider_order(pref).unwrap();
            let seen: HashSet<ProviderKind> = order.iter().copied().collect();
            assert_eq!(order.len(), all.len(), "{pref}");
            assert_eq!(seen, all, "{pref}");
        }
    }
}
