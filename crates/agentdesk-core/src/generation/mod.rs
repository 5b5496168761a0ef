//! The provider-fallback generation pipeline.

pub mod normalize;
pub mod ordering;
pub mod pipeline;

pub use normalize::{
    collapse_and_truncate, normalize_text_request, resolve_max_output_tokens, TRUNCATION_MARKER,
};
pub use ordering::provider_order;
pub use pipeline::GenerationPipeline;
