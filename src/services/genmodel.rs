//! Gemini image generation client.
//!
//! Speaks the `generateContent` REST endpoint: prompt text plus one inline
//! base64 photo in, base64 image data out of the candidate parts. The
//! [`StyleModel`] trait is the seam the worker depends on, so tests can swap
//! in a scripted model.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Keep error snippets short enough to log.
const SNIPPET_LEN: usize = 300;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model rate limited: {0}")]
    RateLimited(String),
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("network error calling model: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("model response contained no image data")]
    MissingImage,
    #[error("unexpected model response: {0}")]
    BadResponse(String),
}

/// One styling call: photo in, styled photo out.
#[async_trait]
pub trait StyleModel: Send + Sync {
    /// Apply `prompt` to a base64-encoded JPEG and return the styled image
    /// bytes as the model produced them.
    async fn stylize(&self, photo_b64: &str, prompt: &str) -> Result<Vec<u8>, ModelError>;
}

/// Client for Google's Gemini image models.
pub struct GeminiImageClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiImageClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl StyleModel for GeminiImageClient {
    async fn stylize(&self, photo_b64: &str, prompt: &str) -> Result<Vec<u8>, ModelError> {
        let url = format!(
            "{GEMINI_BASE}/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&build_request(prompt, photo_b64))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_http_failure(status.as_u16(), &body));
        }
        let bytes = extract_image(&body)?;
        tracing::debug!(
            model = %self.model,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model returned styled image"
        );
        Ok(bytes)
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineDataRef<'a> },
}

#[derive(Serialize)]
struct InlineDataRef<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

// The API answers in camelCase; some proxies pass snake_case through.
#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default, alias = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

fn build_request<'a>(prompt: &'a str, photo_b64: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: [RequestContent {
            parts: [
                RequestPart::Text { text: prompt },
                RequestPart::Image {
                    inline_data: InlineDataRef {
                        mime_type: "image/jpeg",
                        data: photo_b64,
                    },
                },
            ],
        }],
    }
}

/// Map a non-2xx reply onto a model error. Quota exhaustion sometimes arrives
/// with status 400 and only the body tells it apart, so keywords win over the
/// status code.
fn classify_http_failure(status: u16, body: &str) -> ModelError {
    if status == 429 || body.contains("RESOURCE_EXHAUSTED") || body.contains("quota") {
        ModelError::RateLimited(snippet(body))
    } else if status == 503 || body.contains("UNAVAILABLE") || body.contains("overloaded") {
        ModelError::Unavailable(snippet(body))
    } else {
        ModelError::Api {
            status,
            message: snippet(body),
        }
    }
}

/// Pull the first inline image out of a `generateContent` reply and decode it.
fn extract_image(body: &str) -> Result<Vec<u8>, ModelError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ModelError::BadResponse(e.to_string()))?;
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::BadResponse("no candidates in response".into()))?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let data = parts
        .into_iter()
        .find_map(|p| p.inline_data)
        .ok_or(ModelError::MissingImage)?
        .data;
    BASE64
        .decode(&data)
        .map_err(|e| ModelError::BadResponse(format!("image data is not valid base64: {e}")))
}

fn snippet(body: &str) -> String {
    if body.len() <= SNIPPET_LEN {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < SNIPPET_LEN)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    }
}
