//! HTTP transport for Gemini's `generateContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ExtractorConfig;
use crate::extractor::ExtractError;
use crate::model::{GenerateRequest, VisionModel};

/// Gemini client for one model.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

// ── Request body ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
    temperature: f32,
}

// ── Response envelope ──

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, ExtractError> {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = request.image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: &image.media_type,
                    data: &image.data,
                },
            });
        }
        parts.push(Part::Text {
            text: &request.prompt,
        });

        let body = GenerateContentBody {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: &request.response_schema,
                temperature: request.temperature,
            },
        };

        let url = self.url();
        info!(url = %url, "calling generateContent");
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let raw = resp.text().await.map_err(|e| self.transport_error(e))?;
        let envelope: GenerateContentResponse =
            serde_json::from_str(&raw).map_err(ExtractError::Envelope)?;
        reply_text(envelope)
    }
}

impl GeminiClient {
    fn transport_error(&self, e: reqwest::Error) -> ExtractError {
        if e.is_timeout() {
            ExtractError::Timeout(self.timeout)
        } else {
            ExtractError::Http(e)
        }
    }
}

/// Concatenate the first candidate's text parts; nothing usable is a refusal.
fn reply_text(envelope: GenerateContentResponse) -> Result<String, ExtractError> {
    let block_reason = envelope.prompt_feedback.and_then(|f| f.block_reason);
    let Some(candidate) = envelope.candidates.into_iter().next() else {
        return Err(ExtractError::Refusal(
            block_reason.unwrap_or_else(|| "no candidates".into()),
        ));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = block_reason
            .or(candidate.finish_reason)
            .unwrap_or_else(|| "empty candidate".into());
        return Err(ExtractError::Refusal(reason));
    }

    debug!(chars = text.len(), "model replied");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::normalize::ImagePayload;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the request body.
    async fn serve_once(status: u16, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let body_start = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
            let content_length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            while buf.len() < body_start + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            format!(
                "{}\n{}",
                headers,
                String::from_utf8_lossy(&buf[body_start..])
            )
        });
        (format!("http://{addr}/"), handle)
    }

    fn client(endpoint: String) -> GeminiClient {
        let config = ExtractorConfig {
            endpoint,
            timeout: Duration::from_secs(5),
            ..ExtractorConfig::with_api_key("test-key")
        };
        GeminiClient::new(&config).unwrap()
    }

    fn request(image: Option<&ImagePayload>) -> GenerateRequest<'_> {
        GenerateRequest {
            prompt: "read the form".into(),
            image,
            response_schema: json!({"type": "OBJECT"}),
            temperature: 0.1,
        }
    }

    fn envelope(text: &str) -> String {
        json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"},
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn sends_inline_image_and_returns_text() {
        let (endpoint, server) = serve_once(200, envelope("{\"name\":\"Pen\"}")).await;
        let image = ImagePayload {
            data: "aGVsbG8=".into(),
            media_type: "image/png".into(),
            width: 1,
            height: 1,
        };

        let reply = client(endpoint).generate(&request(Some(&image))).await.unwrap();
        assert_eq!(reply, "{\"name\":\"Pen\"}");

        let seen = server.await.unwrap();
        assert!(seen.starts_with("post /v1beta/models/gemini-2.0-flash:generatecontent"));
        assert!(seen.contains("x-goog-api-key: test-key"));
        assert!(seen.contains("\"inline_data\":{\"mime_type\":\"image/png\",\"data\":\"aGVsbG8=\"}"));
        assert!(seen.contains("\"responseMimeType\":\"application/json\""));
        assert!(seen.contains("\"temperature\":0.1"));
    }

    #[tokio::test]
    async fn text_request_has_no_inline_part() {
        let (endpoint, server) = serve_once(200, envelope("{}")).await;
        client(endpoint).generate(&request(None)).await.unwrap();
        let seen = server.await.unwrap();
        assert!(!seen.contains("inline_data"));
        assert!(seen.contains("\"text\":\"read the form\""));
    }

    #[tokio::test]
    async fn server_error_is_network_kind() {
        let (endpoint, _server) = serve_once(403, "{\"error\":\"bad key\"}".into()).await;
        let err = client(endpoint).generate(&request(None)).await.unwrap_err();
        assert!(matches!(err, ExtractError::Server { status: 403, .. }));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn refused_connection_is_network_kind() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}"))
            .generate(&request(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Http(_)));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn blocked_prompt_is_refusal() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let (endpoint, _server) = serve_once(200, blocked).await;
        let err = client(endpoint).generate(&request(None)).await.unwrap_err();
        assert!(matches!(err, ExtractError::Refusal(ref r) if r == "SAFETY"));
        assert_eq!(err.kind(), ErrorKind::ModelRefusal);
    }

    #[tokio::test]
    async fn garbage_envelope_is_parse_kind() {
        let (endpoint, _server) = serve_once(200, "<html>oops</html>".into()).await;
        let err = client(endpoint).generate(&request(None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn multi_part_reply_is_joined() {
        let envelope: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]
        }))
        .unwrap();
        assert_eq!(reply_text(envelope).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let envelope: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "RECITATION"}]
        }))
        .unwrap();
        assert!(matches!(reply_text(envelope), Err(ExtractError::Refusal(r)) if r == "RECITATION"));
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let c = client("http://localhost:9/".into());
        assert_eq!(c.url(), "http://localhost:9/v1beta/models/gemini-2.0-flash:generateContent");
    }
}
