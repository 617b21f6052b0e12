use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Connection and sampling settings for the extraction model.
///
/// Built once by the caller and handed to [`GeminiClient`](crate::GeminiClient)
/// and [`Extractor`](crate::Extractor) at construction.
#[derive(Clone)]
pub struct ExtractorConfig {
    pub api_key: String,
    pub model: String,
    /// Base URL without trailing slash, e.g. `https://generativelanguage.googleapis.com`.
    pub endpoint: String,
    /// Low values favour faithful transcription over creativity.
    pub temperature: f32,
    /// Deadline for one model call; expiry is reported as a network failure.
    pub timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ExtractorConfig {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}
