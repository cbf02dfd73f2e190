//! Client for the remote inference API. The server only sees the
//! `InferenceApi` trait, so tests can swap the network client for a stub

use crate::config::{Config, PROMPT};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;
use tracing::{debug, instrument};

/// Longest slice of an error body kept in an `InferenceError`
const BODY_EXCERPT: usize = 512;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Transport(String),

    #[error("inference API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read inference response: {0}")]
    Body(String),
}

/// The remote detection model: image in, raw response body out
#[async_trait]
pub trait InferenceApi: Send + Sync {
    async fn generate(&self, image: &[u8], mime_type: &str) -> Result<String, InferenceError>;
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// The payload of one `generateContent` call
#[derive(Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl Debug for InferenceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "InferenceRequest {{ contents: <{} parts>, generation_config: {:?} }}",
            self.contents.iter().map(|c| c.parts.len()).sum::<usize>(),
            self.generation_config
        )
    }
}

impl InferenceRequest {
    /// Bundle a base 64 copy of the image with the fixed detection prompt
    pub fn new(image: &[u8], mime_type: &str, generation_config: GenerationConfig) -> Self {
        InferenceRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: general_purpose::STANDARD.encode(image),
                        },
                    },
                    Part::Text {
                        text: PROMPT.to_string(),
                    },
                ],
            }],
            generation_config,
        }
    }
}

/// `InferenceApi` backed by the Gemini `generateContent` endpoint
pub struct GeminiClient {
    client: Client,
    url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GeminiClient {{ url: {}, key: <redacted> }}", self.url)
    }
}

impl GeminiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("GeminiClient needs an API key"))?;
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(GeminiClient {
            client,
            url: format!(
                "{}/models/{}:generateContent",
                config.api_base_url.trim_end_matches('/'),
                config.model
            ),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceApi for GeminiClient {
    #[instrument(skip(self, image), fields(size = image.len()))]
    async fn generate(&self, image: &[u8], mime_type: &str) -> Result<String, InferenceError> {
        let request = InferenceRequest::new(
            image,
            mime_type,
            GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        );
        debug!("sending {request:?} to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await
            // without_url keeps the key out of the message
            .map_err(|e| InferenceError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::Body(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: body.chars().take(BODY_EXCERPT).collect(),
            });
        }

        debug!("inference API returned {} bytes", body.len());
        Ok(body)
    }
}
