use async_trait::async_trait;
use serde_json::Value;

use crate::extractor::ExtractError;
use crate::normalize::ImagePayload;

/// One schema-constrained generation call.
#[derive(Debug)]
pub struct GenerateRequest<'a> {
    pub prompt: String,
    /// Absent for the text overload.
    pub image: Option<&'a ImagePayload>,
    pub response_schema: Value,
    pub temperature: f32,
}

/// A generative model that can read an image (or text) and answer in JSON.
///
/// Implementations return the raw reply text; fence stripping and schema
/// conformance happen in the [`Extractor`](crate::Extractor).
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, ExtractError>;
}
