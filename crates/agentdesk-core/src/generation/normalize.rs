//! Request normalization applied before any provider call.

use agentdesk_providers::{GenerationLimits, TextJob};

use crate::domain::TextGenerationRequest;

/// Appended to text cut down to its character limit.
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Characters reserved at the end of a truncated value for the marker.
const TRUNCATION_RESERVE: usize = 32;

/// Collapse whitespace runs into single spaces and bound the result to
/// `max_chars`, appending [`TRUNCATION_MARKER`] when cut.
pub fn collapse_and_truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(TRUNCATION_RESERVE);
    let head: String = collapsed.chars().take(keep).collect();
    format!("{}{TRUNCATION_MARKER}", head.trim_end())
}

/// `min(requested or default, hard_max)`.
pub fn resolve_max_output_tokens(requested: Option<u32>, limits: &GenerationLimits) -> u32 {
    requested
        .unwrap_or(limits.default_max_output_tokens)
        .min(limits.hard_max_output_tokens)
}

/// Build the provider job for a text request. The caller's request is not
/// modified.
pub fn normalize_text_request(req: &TextGenerationRequest, limits: &GenerationLimits) -> TextJob {
    TextJob {
        prompt: collapse_and_truncate(&req.prompt, limits.text_input_char_limit),
        system_prompt: req
            .system_prompt
            .as_deref()
            .map(|s| collapse_and_truncate(s, limits.system_prompt_char_limit)),
        model_override: req.model_name.clone(),
        temperature: req.temperature,
        max_output_tokens: Some(resolve_max_output_tokens(req.max_output_tokens, limits)),
    }
}
