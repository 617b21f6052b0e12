//! AI layer: image normalization and schema-constrained field extraction
//! through a multimodal generative model.

mod config;
mod extractor;
mod gemini;
mod model;
mod normalize;
pub mod prompt;

pub use config::{DEFAULT_ENDPOINT, DEFAULT_MODEL, ExtractorConfig};
pub use extractor::{ErrorKind, ExtractError, Extraction, Extractor};
pub use gemini::GeminiClient;
pub use model::{GenerateRequest, VisionModel};
pub use normalize::{ImageNormalizer, ImagePayload, NormalizeError, NormalizeStrategy};
