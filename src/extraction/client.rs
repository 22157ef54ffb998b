//! Extraction service capability
//!
//! The pipeline only needs "submit a prompt, get text back". `AnthropicClient`
//! talks to the Anthropic Messages API; tests substitute
//! `testing::ScriptedExtractionClient`.

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// One request to the extraction service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRequest {
    /// User-turn instruction text
    pub prompt: String,
    /// Optional system-level policy (used by the deduplication call)
    pub system: Option<String>,
    /// Response token budget
    pub max_tokens: u32,
}

impl ExtractionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Submit a prompt, receive raw text expected to contain JSON
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Client name for logging
    fn name(&self) -> &str;

    /// Run one completion; no retries
    async fn complete(&self, request: ExtractionRequest) -> Result<String>;
}

/// Run a completion under a time budget. A timeout is reported as
/// `Error::Timeout` and the in-flight request is dropped.
pub async fn complete_with_timeout(
    client: &dyn ExtractionClient,
    request: ExtractionRequest,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, client.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout.as_secs())),
    }
}

/// Anthropic Messages API client
pub struct AnthropicClient {
    client: reqwest::Client,
    config: ExtractionConfig,
}

impl AnthropicClient {
    /// Build a client, reading the API key from `config.api_key_env`
    pub fn from_env(config: ExtractionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, &api_key)
    }

    /// Build a client with an explicit API key
    pub fn new(config: ExtractionConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("extraction API key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|e| Error::Config(format!("invalid API key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/messages") {
            base.to_string()
        } else {
            format!("{base}/messages")
        }
    }

    fn request_body(&self, request: &ExtractionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        body
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// First text block of a Messages API response body
fn first_text_block(raw: &str) -> Result<String> {
    let parsed: MessagesResponse = serde_json::from_str(raw)?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| Error::Extraction("response has no text content".to_string()))
}

#[async_trait]
impl ExtractionClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: ExtractionRequest) -> Result<String> {
        let body = self.request_body(&request);
        let response = self
            .client
            .post(self.messages_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(Error::Extraction(format!(
                "HTTP {}: {}",
                status.as_u16(),
                raw.chars().take(200).collect::<String>()
            )));
        }
        first_text_block(&raw)
    }
}
