//! Gemini inference boundary
//!
//! `InferenceClient` is the seam the pipeline is built on; `GeminiClient`
//! implements it with a blocking call to the `generateContent` REST endpoint.

use std::time::Duration;

use base64::Engine;
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::error::{ConfigError, SubmissionError};

/// Candidate finish reasons that mean the model refused on policy grounds.
const SAFETY_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Anything that can run a multimodal generation request.
pub trait InferenceClient {
    fn generate(&self, request: &GenerateRequest) -> Result<InferenceResponse, SubmissionError>;
}

impl<T: InferenceClient + ?Sized> InferenceClient for &T {
    fn generate(&self, request: &GenerateRequest) -> Result<InferenceResponse, SubmissionError> {
        (**self).generate(request)
    }
}

/// One generation call: ordered content parts plus decoding and safety settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    pub config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// Encoded image bytes sent inline
    Image { mime_type: String, data: Vec<u8> },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: BlockThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockThreshold {
    BlockOnlyHigh,
}

/// Reading text from a response the service refused to generate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("response blocked by safety filters ({reason})")]
pub struct Blocked {
    pub reason: String,
}

/// Raw model output. Text access fails when the service blocked generation,
/// so callers check [`InferenceResponse::is_blocked`] first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResponse {
    text: Option<String>,
    block_reason: Option<String>,
}

impl InferenceResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            block_reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            text: None,
            block_reason: Some(reason.into()),
        }
    }

    /// Decode a `generateContent` response body.
    pub fn from_envelope(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: WireResponse = serde_json::from_slice(body)?;

        if let Some(reason) = envelope.prompt_feedback.and_then(|f| f.block_reason) {
            return Ok(Self::blocked(reason));
        }

        let Some(candidate) = envelope.candidates.into_iter().next() else {
            return Ok(Self::blocked("NO_CANDIDATES"));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.thought.unwrap_or(false))
            .filter_map(|p| p.text)
            .collect();

        if let Some(reason) = candidate.finish_reason {
            if text.is_empty() && SAFETY_FINISH_REASONS.contains(&reason.as_str()) {
                return Ok(Self::blocked(reason));
            }
        }

        Ok(Self::from_text(text))
    }

    pub fn is_blocked(&self) -> bool {
        self.block_reason.is_some()
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.block_reason.as_deref()
    }

    pub fn text(&self) -> Result<&str, Blocked> {
        match (&self.block_reason, &self.text) {
            (Some(reason), _) => Err(Blocked {
                reason: reason.clone(),
            }),
            (None, text) => Ok(text.as_deref().unwrap_or_default()),
        }
    }
}

/// Blocking client for the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl GeminiClient {
    /// Fails when the key is blank. No request timeout is applied; callers
    /// that need one wrap the call.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::Missing("GEMINI_API_KEY"));
        }

        let http = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ConfigError> {
        Self::new(config.api_key.clone(), config.base_url.clone())
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl InferenceClient for GeminiClient {
    fn generate(&self, request: &GenerateRequest) -> Result<InferenceResponse, SubmissionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&WireRequest::from(request))
            .send()?;

        let status = resp.status();
        let body = resp.bytes()?;
        debug!("[gemini] {} -> {} ({} bytes)", request.model, status, body.len());

        if !status.is_success() {
            return Err(SubmissionError::UnexpectedStatus {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        InferenceResponse::from_envelope(&body).map_err(SubmissionError::Envelope)
    }
}

// Wire format

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: Vec<WireContentOut>,
    generation_config: &'a GenerationConfig,
    safety_settings: &'a [SafetySetting],
}

#[derive(Serialize)]
struct WireContentOut {
    role: &'static str,
    parts: Vec<WirePartOut>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum WirePartOut {
    InlineData(WireBlob),
    Text(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

impl<'a> From<&'a GenerateRequest> for WireRequest<'a> {
    fn from(request: &'a GenerateRequest) -> Self {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Image { mime_type, data } => WirePartOut::InlineData(WireBlob {
                    mime_type: mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                }),
                ContentPart::Text(text) => WirePartOut::Text(text.clone()),
            })
            .collect();

        WireRequest {
            contents: vec![WireContentOut { role: "user", parts }],
            generation_config: &request.config,
            safety_settings: &request.safety_settings,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    prompt_feedback: Option<WirePromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireContentIn>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireContentIn {
    #[serde(default)]
    parts: Vec<WirePartIn>,
}

#[derive(Deserialize)]
struct WirePartIn {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePromptFeedback {
    block_reason: Option<String>,
}
