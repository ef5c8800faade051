use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AssistantError, Result};

/// Sampling and output settings sent with every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl GenerationConfig {
    /// Settings for a structured analysis; the model is asked for JSON.
    pub fn analysis() -> Self {
        Self {
            temperature: 0.4,
            top_k: 32,
            top_p: 0.95,
            max_output_tokens: 4096,
            response_mime_type: "application/json".to_string(),
        }
    }

    /// Settings for a plain-text follow-up answer.
    pub fn conversational() -> Self {
        Self {
            response_mime_type: "text/plain".to_string(),
            ..Self::analysis()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Performs one call to a generative text endpoint and returns the raw body.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, instruction: &str, generation: &GenerationConfig) -> Result<String>;
}

/// Client for the Gemini `generateContent` endpoint.
///
/// One POST per call: no retries, no streaming.
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?.to_string();
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AssistantError::NetworkFailure(e.without_url()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn generate(&self, instruction: &str, generation: &GenerationConfig) -> Result<String> {
        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: instruction }],
            }],
            generation_config: generation,
        };

        info!(
            model = %self.model,
            instruction_chars = instruction.chars().count(),
            response_mime_type = %generation.response_mime_type,
            "calling model endpoint"
        );

        // the key travels as a query parameter; errors are stripped of the URL
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AssistantError::NetworkFailure(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::NetworkFailure(e.without_url()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "model endpoint returned an error");
            return Err(AssistantError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        info!(body_chars = body.len(), "model endpoint responded");
        Ok(body)
    }
}
