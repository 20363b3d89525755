//! Typed client for the structured-extraction capability (an
//! Anthropic-style messages endpoint).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ModelError;
use crate::models::config::AiConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Client for the model endpoint.
///
/// Built once at startup from [`AiConfig`] and shared by reference; there is
/// no lazily-constructed global.
#[derive(Debug, Clone)]
pub struct ModelClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl ModelClient {
    pub fn from_config(config: &AiConfig) -> Result<Self, ModelError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or(ModelError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Override the endpoint, e.g. for a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send one user turn and return the first text block of the reply.
    ///
    /// Rate limiting and 5xx responses surface as a typed upstream error;
    /// retrying is the caller's decision, and the pipeline deliberately does
    /// not retry.
    pub async fn complete(&self, content: Vec<ContentBlock>) -> Result<String, ModelError> {
        let payload = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body: MessagesResponse = response.json().await?;
        debug!("model reply carried {} content blocks", body.content.len());

        body.content
            .into_iter()
            .find_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .ok_or(ModelError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

/// Request content blocks understood by the endpoint.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// A document passed natively (PDF bytes).
    Document { source: MediaSource },
    /// A rasterized page.
    Image { source: MediaSource },
    /// Instruction or inline statement text.
    Text { text: String },
}

impl ContentBlock {
    pub fn document(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::Document {
            source: MediaSource::base64(media_type, bytes),
        }
    }

    pub fn image(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::Image {
            source: MediaSource::base64(media_type, bytes),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    Base64 { media_type: String, data: String },
}

impl MediaSource {
    fn base64(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        Self::Base64 {
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}
