//! Extraction client: one model call per scan that always ends in a complete
//! [`ExtractionResult`].
//!
//! [`Extractor::try_extract_image`] and [`Extractor::try_extract_text`] report
//! failures as typed errors. [`Extractor::extract_image`] and
//! [`Extractor::extract_text`] settle them into an [`Extraction`]: the
//! zero-confidence fallback plus the error that caused it.

use std::time::Duration;

use chrono::Utc;
use formscan_core::{DomainProfile, ExtractionResult, ReplyError};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ExtractorConfig;
use crate::gemini::GeminiClient;
use crate::model::{GenerateRequest, VisionModel};
use crate::normalize::ImagePayload;
use crate::prompt;

/// Coarse failure class surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The call failed, was rejected by the endpoint, or timed out.
    Network,
    /// The reply was not JSON of the expected shape.
    Parse,
    /// The model answered with nothing (empty or blocked).
    ModelRefusal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parse => "parse",
            Self::ModelRefusal => "model-refusal",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network => {
                "Could not reach the extraction service. Check the connection and retry, or fill in the form manually."
            }
            Self::Parse => {
                "The scan could not be read reliably. Try a clearer image, or fill in the form manually."
            }
            Self::ModelRefusal => {
                "Nothing could be extracted from this document. Try another image, or fill in the form manually."
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model endpoint returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("malformed response envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("could not read model reply: {0}")]
    Reply(#[from] ReplyError),

    #[error("model returned no content: {0}")]
    Refusal(String),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) | Self::Server { .. } | Self::Timeout(_) => ErrorKind::Network,
            Self::Envelope(_) | Self::Reply(_) => ErrorKind::Parse,
            Self::Refusal(_) => ErrorKind::ModelRefusal,
        }
    }
}

/// Settled outcome of one scan: always a complete result.
#[derive(Debug)]
pub struct Extraction {
    pub result: ExtractionResult,
    /// Why `result` is the fallback, if it is.
    pub failure: Option<ExtractError>,
}

impl Extraction {
    /// Collapse a typed outcome into a complete result, substituting the
    /// fallback on error.
    pub fn settle(profile: &DomainProfile, outcome: Result<ExtractionResult, ExtractError>) -> Self {
        match outcome {
            Ok(result) => Self {
                result,
                failure: None,
            },
            Err(e) => {
                warn!(
                    profile = profile.name,
                    kind = e.kind().as_str(),
                    error = %e,
                    "extraction failed, using fallback"
                );
                Self {
                    result: ExtractionResult::fallback_now(&profile.schema),
                    failure: Some(e),
                }
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }

    /// User-facing message for a fallback outcome.
    pub fn message(&self) -> Option<&'static str> {
        self.failure.as_ref().map(|e| e.kind().user_message())
    }
}

/// Drives a [`VisionModel`] with the profile's prompt and response schema.
pub struct Extractor<M> {
    model: M,
    temperature: f32,
    timeout: Duration,
}

impl Extractor<GeminiClient> {
    /// Extractor backed by the Gemini `generateContent` endpoint.
    pub fn gemini(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        Ok(Self::new(GeminiClient::new(config)?, config))
    }
}

impl<M: VisionModel> Extractor<M> {
    pub fn new(model: M, config: &ExtractorConfig) -> Self {
        Self {
            model,
            temperature: config.temperature,
            timeout: config.timeout,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn try_extract_image(
        &self,
        image: &ImagePayload,
        profile: &DomainProfile,
    ) -> Result<ExtractionResult, ExtractError> {
        let request = GenerateRequest {
            prompt: prompt::image_instructions(profile),
            image: Some(image),
            response_schema: prompt::response_schema(&profile.schema),
            temperature: self.temperature,
        };
        self.run(&request, profile).await
    }

    pub async fn try_extract_text(
        &self,
        raw_text: &str,
        profile: &DomainProfile,
    ) -> Result<ExtractionResult, ExtractError> {
        if raw_text.trim().is_empty() {
            return Err(ExtractError::Refusal("no text was recognised".into()));
        }
        let request = GenerateRequest {
            prompt: prompt::text_instructions(profile, raw_text),
            image: None,
            response_schema: prompt::response_schema(&profile.schema),
            temperature: self.temperature,
        };
        self.run(&request, profile).await
    }

    pub async fn extract_image(&self, image: &ImagePayload, profile: &DomainProfile) -> Extraction {
        Extraction::settle(profile, self.try_extract_image(image, profile).await)
    }

    pub async fn extract_text(&self, raw_text: &str, profile: &DomainProfile) -> Extraction {
        Extraction::settle(profile, self.try_extract_text(raw_text, profile).await)
    }

    async fn run(
        &self,
        request: &GenerateRequest<'_>,
        profile: &DomainProfile,
    ) -> Result<ExtractionResult, ExtractError> {
        info!(
            model = self.model.name(),
            profile = profile.name,
            image = request.image.is_some(),
            "requesting extraction"
        );

        let reply = tokio::time::timeout(self.timeout, self.model.generate(request))
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout))??;

        if reply.trim().is_empty() {
            return Err(ExtractError::Refusal("empty response body".into()));
        }

        let result = ExtractionResult::from_reply(&profile.schema, &reply, Utc::now().date_naive())?;
        info!(
            profile = profile.name,
            confidence = result.confidence(),
            "extraction complete"
        );
        Ok(result)
    }
}
