//! HTTP client for the generateContent endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::browser::Command;
use crate::config::InterpreterConfig;

use super::prompt::{build_prompt, parse_command};
use super::{Interpret, InterpretError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate
    fn command_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Interpreter backed by a Gemini-style `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiInterpreter {
    client: reqwest::Client,
    endpoint: String,
    max_output_tokens: u32,
}

impl GeminiInterpreter {
    pub fn new(config: &InterpreterConfig) -> Result<Self, InterpretError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| InterpretError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            max_output_tokens: config.max_output_tokens,
        })
    }
}

#[async_trait]
impl Interpret for GeminiInterpreter {
    async fn interpret(&self, credential: &str, transcript: &str) -> Result<Command, InterpretError> {
        let prompt = build_prompt(transcript);
        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
            },
        };

        debug!(endpoint = %self.endpoint, transcript, "sending interpretation request");

        // The key travels in the query string, so errors are stripped of
        // their URL before being logged or shown
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", credential)])
            .json(&body)
            .send()
            .await
            .map_err(|e| InterpretError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %detail, "interpretation service returned an error");
            return Err(InterpretError::Status(status.as_u16()));
        }

        let envelope: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InterpretError::InvalidEnvelope(e.without_url().to_string()))?;

        let Some(text) = envelope.command_text() else {
            warn!(?envelope, "response has no candidate text");
            return Err(InterpretError::InvalidEnvelope("missing candidate text".into()));
        };

        debug!(raw = text, "raw interpretation reply");
        parse_command(text).inspect_err(|e| warn!(raw = text, error = ?e, "unusable interpretation reply"))
    }
}
