//! Model transport boundary
//!
//! The thread core talks to the remote model only through the [`Transport`]
//! trait: one full request/response exchange, one streaming exchange, and the
//! thin passthrough endpoints (embeddings, moderation, speech, image
//! generation). Transport-level failures (network, auth, rate limit) are
//! propagated to the caller unchanged; the core never retries.
//!
//! [`HttpTransport`] is the production implementation over an
//! OpenAI-compatible HTTP API. Tests substitute their own implementation.

use crate::types::{ImageResult, ModerationVerdict};
use crate::wire::{ChatRequest, ChatResponse, FragmentStream, fragment_stream};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Boundary to the remote model.
///
/// `timeout` is a per-call deadline in seconds, resolved from thread options
/// and per-call overrides; enforcing it is the transport's job. The core has
/// no deadline clock of its own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// One non-streaming exchange: full request in, complete result out
    async fn complete(&self, request: ChatRequest, timeout: u64) -> Result<ChatResponse>;

    /// One streaming exchange: full request in, lazy ordered fragment
    /// sequence out. The request must carry `stream: true`.
    async fn stream(&self, request: ChatRequest, timeout: u64) -> Result<FragmentStream>;

    /// Embedding passthrough: input text to embedding vector
    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>>;

    /// Moderation passthrough: input text to flagged verdict
    async fn moderate(&self, input: &str) -> Result<ModerationVerdict>;

    /// Speech passthrough: input text to audio bytes
    async fn speak(&self, model: &str, voice: &str, input: &str) -> Result<Vec<u8>>;

    /// Image-generation passthrough: prompt to URL or base64 payload
    async fn generate_image(&self, model: &str, prompt: &str) -> Result<ImageResult>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationDatum>,
}

#[derive(Debug, Deserialize)]
struct ModerationDatum {
    flagged: bool,
    #[serde(default)]
    categories: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageResult>,
}

/// HTTP transport over an OpenAI-compatible API
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}

fn http_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}

impl HttpTransport {
    /// Build a transport with connection pooling and a default timeout.
    ///
    /// Per-call timeouts from run overrides are applied on top per request.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    /// Send a request and fail on non-success status with the response body
    /// attached, before any payload parsing is attempted.
    async fn send_checked(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(Error::api(format!("{status}: {body}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn complete(&self, request: ChatRequest, timeout: u64) -> Result<ChatResponse> {
        log::debug!(
            "chat completion request: model={} messages={} tools={}",
            request.model,
            request.messages.len(),
            request.tools.as_ref().map_or(0, |t| t.len())
        );

        let response = self
            .send_checked(
                self.post("/chat/completions")
                    .timeout(Duration::from_secs(timeout))
                    .json(&request),
            )
            .await?;

        response.json::<ChatResponse>().await.map_err(http_error)
    }

    async fn stream(&self, request: ChatRequest, timeout: u64) -> Result<FragmentStream> {
        log::debug!(
            "chat stream request: model={} messages={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .send_checked(
                self.post("/chat/completions")
                    .timeout(Duration::from_secs(timeout))
                    .json(&request),
            )
            .await?;

        Ok(fragment_stream(response))
    }

    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>> {
        let response = self
            .send_checked(
                self.post("/embeddings")
                    .json(&serde_json::json!({"model": model, "input": input})),
            )
            .await?;

        let parsed: EmbeddingResponse = response.json().await.map_err(http_error)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::api("embedding response carried no data"))
    }

    async fn moderate(&self, input: &str) -> Result<ModerationVerdict> {
        let response = self
            .send_checked(
                self.post("/moderations")
                    .json(&serde_json::json!({"input": input})),
            )
            .await?;

        let parsed: ModerationResponse = response.json().await.map_err(http_error)?;
        parsed
            .results
            .into_iter()
            .next()
            .map(|r| ModerationVerdict {
                flagged: r.flagged,
                categories: r.categories,
            })
            .ok_or_else(|| Error::api("moderation response carried no results"))
    }

    async fn speak(&self, model: &str, voice: &str, input: &str) -> Result<Vec<u8>> {
        let response = self
            .send_checked(self.post("/audio/speech").json(&serde_json::json!({
                "model": model,
                "voice": voice,
                "input": input
            })))
            .await?;

        Ok(response.bytes().await.map_err(http_error)?.to_vec())
    }

    async fn generate_image(&self, model: &str, prompt: &str) -> Result<ImageResult> {
        let response = self
            .send_checked(self.post("/images/generations").json(&serde_json::json!({
                "model": model,
                "prompt": prompt,
                "n": 1
            })))
            .await?;

        let parsed: ImageResponse = response.json().await.map_err(http_error)?;
        parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::api("image response carried no data"))
    }
}
