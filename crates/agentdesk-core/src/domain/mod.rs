//! Domain types and error taxonomy.

pub mod actor;
pub mod error;
pub mod generation;

pub use actor::Actor;
pub use error::{DeskError, ErrorClass, Result};
pub use generation::{
    ImageGenerationRequest, ImageGenerationResponse, TextGenerationRequest,
    TextGenerationResponse,
};
