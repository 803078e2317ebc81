//! Core types for the chat-thread crate
//!
//! Defines the conversation data model (messages, tool calls, usage counters),
//! the per-thread configuration with its builder, per-call overrides, and the
//! tagged last-result slot.

use crate::config;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model inside an assistant message.
///
/// `arguments` is kept as the raw string payload exactly as the API sent it;
/// it is parsed as JSON only at execution time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the raw argument payload as JSON. An empty payload parses as `{}`.
    pub fn parse_arguments(&self) -> Result<serde_json::Value> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&self.arguments).map_err(|e| {
            Error::invalid_input(format!(
                "tool call '{}' carries malformed arguments: {}",
                self.name, e
            ))
        })
    }
}

/// A message in the conversation, tagged by role.
///
/// Assistant messages may carry an ordered list of requested tool calls;
/// tool messages carry the id of the call they answer. The transcript never
/// reorders messages, so a tool message always follows the assistant message
/// that emitted its call id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System {
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message::Assistant {
            content: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Assistant message carrying requested tool calls
    pub fn assistant_with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: text.into(),
            tool_calls,
        }
    }

    /// Tool-result message answering the call with the given id
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Tool calls requested by this message (empty for non-assistant roles)
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Monotonically accumulating usage counters for one thread.
///
/// Summed across every completed non-streaming call; never reset
/// automatically. Streamed calls do not report token counts and therefore
/// do not contribute.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub tool_calls: u64,
}

impl Usage {
    /// Fold one call's reported token counts into the running totals
    pub fn absorb_tokens(&mut self, prompt: u64, completion: u64, total: u64) {
        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
        self.total_tokens += total;
    }
}

/// Response-format mode advertised to the model
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Per-call overrides that shadow the stored thread options field-by-field.
///
/// Overrides apply to exactly one call and never mutate stored state.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<u64>,
    pub response_format: Option<ResponseFormat>,
}

impl RunOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// Resolved configuration snapshot for one call
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: u64,
    pub response_format: ResponseFormat,
}

/// Options for configuring a conversation thread
#[derive(Clone)]
pub struct ThreadOptions {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Model name (e.g. "gpt-4o-mini")
    pub model: String,

    /// OpenAI-compatible endpoint URL
    pub base_url: String,

    /// Sampling temperature (0.0 to 2.0)
    pub temperature: f32,

    /// Maximum tokens to generate (None uses provider default)
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Response-format mode for completion calls
    pub response_format: ResponseFormat,
}

impl std::fmt::Debug for ThreadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadOptions")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("response_format", &self.response_format)
            .finish()
    }
}

impl ThreadOptions {
    /// Create a new builder for ThreadOptions
    pub fn builder() -> ThreadOptionsBuilder {
        ThreadOptionsBuilder::default()
    }

    /// Resolve this configuration against per-call overrides.
    ///
    /// Override fields shadow stored fields one by one; unset fields fall
    /// through to the stored values.
    pub fn resolve(&self, overrides: &RunOverrides) -> RunConfig {
        RunConfig {
            model: overrides.model.clone().unwrap_or_else(|| self.model.clone()),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            timeout: overrides.timeout.unwrap_or(self.timeout),
            response_format: overrides.response_format.unwrap_or(self.response_format),
        }
    }
}

/// Builder for ThreadOptions
#[derive(Default)]
pub struct ThreadOptionsBuilder {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<u64>,
    response_format: Option<ResponseFormat>,
}

impl ThreadOptionsBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Build the options, falling back to the environment for unset fields.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no API key or model is available from
    /// either the builder or the environment. Nothing is partially
    /// constructed on failure.
    pub fn build(self) -> Result<ThreadOptions> {
        let api_key = self
            .api_key
            .or_else(config::env_api_key)
            .ok_or_else(|| Error::config("api_key is required"))?;

        let model = self
            .model
            .or_else(config::env_model)
            .ok_or_else(|| Error::config("model is required"))?;

        Ok(ThreadOptions {
            api_key,
            model,
            base_url: self
                .base_url
                .or_else(config::env_base_url)
                .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string()),
            temperature: self.temperature.unwrap_or(0.7),
            max_tokens: self.max_tokens,
            timeout: self.timeout.unwrap_or(60),
            response_format: self.response_format.unwrap_or_default(),
        })
    }
}

/// The assistant result of one completed (non-streaming or synthesized
/// streaming) chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Moderation verdict for a single input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    /// Category scores/flags exactly as reported by the endpoint
    pub categories: serde_json::Value,
}

/// Result of an image-generation call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
}

/// The most recent terminal outcome of any run-type call on a thread.
///
/// One variant per call kind, so a caller can never misinterpret the active
/// case: the typed accessors fail with [`Error::ResultKind`] instead of
/// handing back the wrong shape. Overwritten on every call, never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum LastResult {
    #[default]
    None,
    Chat(ChatReply),
    Vision(String),
    Embedding(Vec<f32>),
    Speech(Vec<u8>),
    Moderation(ModerationVerdict),
    Image(ImageResult),
}

impl LastResult {
    /// Short name of the active variant
    pub fn kind(&self) -> &'static str {
        match self {
            LastResult::None => "none",
            LastResult::Chat(_) => "chat",
            LastResult::Vision(_) => "vision",
            LastResult::Embedding(_) => "embedding",
            LastResult::Speech(_) => "speech",
            LastResult::Moderation(_) => "moderation",
            LastResult::Image(_) => "image",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, LastResult::None)
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::ResultKind {
            expected,
            actual: self.kind(),
        }
    }

    pub fn as_chat(&self) -> Result<&ChatReply> {
        match self {
            LastResult::Chat(reply) => Ok(reply),
            other => Err(other.mismatch("chat")),
        }
    }

    pub fn as_vision(&self) -> Result<&str> {
        match self {
            LastResult::Vision(text) => Ok(text),
            other => Err(other.mismatch("vision")),
        }
    }

    pub fn as_embedding(&self) -> Result<&[f32]> {
        match self {
            LastResult::Embedding(vector) => Ok(vector),
            other => Err(other.mismatch("embedding")),
        }
    }

    pub fn as_speech(&self) -> Result<&[u8]> {
        match self {
            LastResult::Speech(audio) => Ok(audio),
            other => Err(other.mismatch("speech")),
        }
    }

    pub fn as_moderation(&self) -> Result<&ModerationVerdict> {
        match self {
            LastResult::Moderation(verdict) => Ok(verdict),
            other => Err(other.mismatch("moderation")),
        }
    }

    pub fn as_image(&self) -> Result<&ImageResult> {
        match self {
            LastResult::Image(image) => Ok(image),
            other => Err(other.mismatch("image")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ThreadOptions {
        ThreadOptions::builder()
            .api_key("test-key")
            .model("test-model")
            .build()
            .unwrap()
    }

    #[test]
    fn test_thread_options_builder() {
        let options = ThreadOptions::builder()
            .api_key("test-key")
            .model("test-model")
            .base_url("http://localhost:1234/v1")
            .temperature(0.5)
            .max_tokens(1000)
            .timeout(30)
            .response_format(ResponseFormat::Json)
            .build()
            .unwrap();

        assert_eq!(options.api_key, "test-key");
        assert_eq!(options.model, "test-model");
        assert_eq!(options.base_url, "http://localhost:1234/v1");
        assert_eq!(options.temperature, 0.5);
        assert_eq!(options.max_tokens, Some(1000));
        assert_eq!(options.timeout, 30);
        assert_eq!(options.response_format, ResponseFormat::Json);
    }

    #[test]
    fn test_thread_options_defaults() {
        let options = options();
        assert_eq!(options.base_url, config::DEFAULT_BASE_URL);
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.max_tokens, None);
        assert_eq!(options.timeout, 60);
        assert_eq!(options.response_format, ResponseFormat::Text);
    }

    #[test]
    fn test_thread_options_debug_masks_key() {
        let formatted = format!("{:?}", options());
        assert!(!formatted.contains("test-key"));
        assert!(formatted.contains("***"));
    }

    #[test]
    fn test_resolve_overrides_shadow_field_by_field() {
        let options = options();
        let overrides = RunOverrides::new().temperature(0.0).max_tokens(64);
        let config = options.resolve(&overrides);

        assert_eq!(config.model, "test-model"); // not overridden
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, Some(64));
        assert_eq!(config.timeout, 60);
    }

    #[test]
    fn test_resolve_without_overrides_mirrors_options() {
        let options = options();
        let config = options.resolve(&RunOverrides::default());
        assert_eq!(config.model, options.model);
        assert_eq!(config.temperature, options.temperature);
        assert_eq!(config.response_format, options.response_format);
    }

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.content(), "Hello");
        assert!(msg.tool_calls().is_empty());

        let call = ToolCall::new("call_1", "lookup", "{}");
        let msg = Message::assistant_with_calls("", vec![call.clone()]);
        assert_eq!(msg.role(), Role::Assistant);
        assert_eq!(msg.tool_calls(), &[call]);

        let msg = Message::tool("call_1", "42");
        assert_eq!(msg.role(), Role::Tool);
        assert_eq!(msg.content(), "42");
    }

    #[test]
    fn test_message_role_serialization() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        let json = serde_json::to_value(Message::tool("call_1", "ok")).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
    }

    #[test]
    fn test_tool_call_parse_arguments() {
        let call = ToolCall::new("c1", "add", r#"{"a":1,"b":2}"#);
        let args = call.parse_arguments().unwrap();
        assert_eq!(args["a"], 1);

        let empty = ToolCall::new("c2", "ping", "");
        assert_eq!(empty.parse_arguments().unwrap(), serde_json::json!({}));

        let bad = ToolCall::new("c3", "add", "{not json");
        assert!(bad.parse_arguments().is_err());
    }

    #[test]
    fn test_usage_absorb() {
        let mut usage = Usage::default();
        usage.absorb_tokens(10, 5, 15);
        usage.absorb_tokens(10, 5, 15);
        assert_eq!(usage.prompt_tokens, 20);
        assert_eq!(usage.completion_tokens, 10);
        assert_eq!(usage.total_tokens, 30);
        assert_eq!(usage.tool_calls, 0);
    }

    #[test]
    fn test_last_result_accessors() {
        let result = LastResult::Embedding(vec![0.1, 0.2]);
        assert_eq!(result.kind(), "embedding");
        assert_eq!(result.as_embedding().unwrap().len(), 2);

        let err = result.as_chat().unwrap_err();
        match err {
            Error::ResultKind { expected, actual } => {
                assert_eq!(expected, "chat");
                assert_eq!(actual, "embedding");
            }
            other => panic!("expected ResultKind error, got {other:?}"),
        }
    }

    #[test]
    fn test_last_result_default_is_none() {
        let result = LastResult::default();
        assert!(result.is_none());
        assert!(result.as_chat().is_err());
    }

    #[test]
    fn test_last_result_serde_round_trip() {
        let result = LastResult::Moderation(ModerationVerdict {
            flagged: true,
            categories: serde_json::json!({"violence": 0.9}),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "moderation");
        let back: LastResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
