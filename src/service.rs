//! Client for the external image-generation service.
//!
//! The service receives the composited map plus a fixed instruction and
//! answers with at most one image. `ImageGenerator` is the seam the rest of
//! the app talks to; `GeminiClient` speaks the `generateContent` REST shape.

use std::time::{Duration, Instant};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::composite::CompositedArtifact;
use crate::config::GeneratorConfig;
use crate::error::{snippet, ServiceError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub artifact: CompositedArtifact,
    pub prompt: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// The single resolution of one generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Image(GeneratedImage),
    /// The service answered but produced no image.
    Empty,
    Failed(String),
}

impl From<Result<Option<GeneratedImage>, ServiceError>> for GenerationOutcome {
    fn from(result: Result<Option<GeneratedImage>, ServiceError>) -> Self {
        match result {
            Ok(Some(image)) if !image.bytes.is_empty() => Self::Image(image),
            Ok(_) => Self::Empty,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Provider-neutral generation call. Enables mocking in tests.
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<GeneratedImage>, ServiceError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &GeneratorConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ServiceError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait::async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<GeneratedImage>, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::MissingApiKey)?;
        let body = build_request(request);
        let started = Instant::now();

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Request(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::Request(e.without_url().to_string()))?;
        let elapsed_ms = started.elapsed().as_millis();

        if !(200..300).contains(&status) {
            warn!(model = %self.model, status, elapsed_ms, "service: non-success status");
            return Err(ServiceError::Status {
                status,
                snippet: error_message(&text),
            });
        }

        let image = parse_response(&text)?;
        info!(
            model = %self.model,
            elapsed_ms,
            image = image.is_some(),
            "service: generation finished"
        );
        Ok(image)
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_request(request: &GenerationRequest) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![RequestContent {
            role: "user",
            parts: vec![
                RequestPart::Inline {
                    inline_data: InlineData {
                        mime_type: request.artifact.mime.clone(),
                        data: request.artifact.base64(),
                    },
                },
                RequestPart::Text {
                    text: &request.prompt,
                },
            ],
        }],
    }
}

/// First inline image across all candidates, or `None` when there is none.
fn parse_response(text: &str) -> Result<Option<GeneratedImage>, ServiceError> {
    let response: GenerateResponse =
        serde_json::from_str(text).map_err(|e| ServiceError::Parse(e.to_string()))?;

    let first = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data);

    let Some(inline) = first else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ServiceError::Blocked(reason));
        }
        return Ok(None);
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| ServiceError::Payload(e.to_string()))?;
    Ok(Some(GeneratedImage {
        mime: inline.mime_type,
        bytes,
    }))
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => snippet(&envelope.error.message),
        Err(_) => snippet(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            artifact: CompositedArtifact {
                mime: "image/jpeg".into(),
                bytes: vec![1, 2, 3],
            },
            prompt: "look north".into(),
        }
    }

    #[test]
    fn request_body_carries_image_and_prompt() {
        let req = request();
        let json = serde_json::to_value(build_request(&req)).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "look north");
    }

    #[test]
    fn first_image_part_wins() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [
                    {"text": "here you go"},
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}},
                    {"inlineData": {"mimeType": "image/jpeg", "data": "BAUG"}}
                ]}
            }]
        }"#;
        let image = parse_response(body).unwrap().unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn text_only_answer_is_empty() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "I cannot"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), None);
        assert_eq!(parse_response(r#"{}"#).unwrap(), None);
    }

    #[test]
    fn blocked_prompt_is_a_failure() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, ServiceError::Blocked(ref r) if r == "SAFETY"));
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(parse_response("<html>"), Err(ServiceError::Parse(_))));
        let body = r#"{"candidates": [{"content": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "***"}}
        ]}}]}"#;
        assert!(matches!(parse_response(body), Err(ServiceError::Payload(_))));
    }

    #[test]
    fn api_error_message_is_extracted() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted"}}"#;
        assert_eq!(error_message(body), "Resource has been exhausted");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn outcome_from_result() {
        let image = GeneratedImage {
            mime: "image/png".into(),
            bytes: vec![9],
        };
        assert_eq!(
            GenerationOutcome::from(Ok(Some(image.clone()))),
            GenerationOutcome::Image(image)
        );
        let hollow = GeneratedImage {
            mime: "image/png".into(),
            bytes: Vec::new(),
        };
        assert_eq!(GenerationOutcome::from(Ok(Some(hollow))), GenerationOutcome::Empty);
        assert_eq!(GenerationOutcome::from(Ok(None)), GenerationOutcome::Empty);
        assert!(matches!(
            GenerationOutcome::from(Err(ServiceError::MissingApiKey)),
            GenerationOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = GeminiClient::new(&GeneratorConfig::default()).unwrap();
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingApiKey));
    }

    #[test]
    fn endpoint_includes_model() {
        let config = GeneratorConfig {
            base_url: "http://localhost:1234/v1beta".into(),
            model: "m1".into(),
            ..GeneratorConfig::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1234/v1beta/models/m1:generateContent");
    }
}
