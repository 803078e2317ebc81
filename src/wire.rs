//! Wire-level payloads and streaming decode
//!
//! Everything the remote API sees or sends lives here: the request/response
//! structs for the chat endpoint and the passthrough endpoints, the pure
//! request builder, and the SSE fragment decoder used by streaming calls.
//!
//! The request builder is a pure function of (transcript snapshot, tool
//! specs, run config, stream flag). Tool declarations are advertised only on
//! non-streaming calls; callers enforce that by passing `None` for tools when
//! streaming.

use crate::tools::ToolSpec;
use crate::types::{ChatReply, Message, ResponseFormat, RunConfig, ToolCall};
use crate::{Error, Result};
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Message content on the wire: a plain string or an array of content parts
/// (used by vision calls carrying image URLs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
}

/// One message in the wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Tool call in the wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunction,
}

/// Function name + raw argument string inside a wire tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    pub arguments: String,
}

/// Chat completion request payload
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

/// Token counts reported by a completed call
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Full (non-incremental) chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

/// One choice in a full response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: WireMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Extract the assistant reply from the first choice.
    ///
    /// A response with no choices is a protocol-level error.
    pub fn into_reply(self) -> Result<(ChatReply, Option<WireUsage>)> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::api("response carried no choices"))?;

        let content = match choice.message.content {
            Some(WireContent::Text(text)) => text,
            // Parts never appear in completion responses; flatten defensively
            Some(WireContent::Parts(parts)) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join(""),
            None => String::new(),
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, call.function.arguments))
            .collect();

        Ok((
            ChatReply {
                content,
                tool_calls,
                model: self.model,
            },
            self.usage,
        ))
    }
}

/// Incremental chunk of a streaming response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    pub choices: Vec<ChunkChoice>,
}

/// One choice inside a streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta payload of a streaming chunk; only text content is expected because
/// tools are never advertised on streaming calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Convert one transcript message to its wire form
fn to_wire_message(msg: &Message) -> WireMessage {
    match msg {
        Message::System { content } => WireMessage {
            role: "system".to_string(),
            content: Some(WireContent::Text(content.clone())),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::User { content } => WireMessage {
            role: "user".to_string(),
            content: Some(WireContent::Text(content.clone())),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant {
            content,
            tool_calls,
        } => {
            let calls = if tool_calls.is_empty() {
                None
            } else {
                Some(
                    tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            call_type: "function".to_string(),
                            function: WireFunction {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            };
            WireMessage {
                role: "assistant".to_string(),
                // The API requires content even when empty alongside tool_calls
                content: Some(WireContent::Text(content.clone())),
                tool_calls: calls,
                tool_call_id: None,
            }
        }
        Message::Tool {
            tool_call_id,
            content,
        } => WireMessage {
            role: "tool".to_string(),
            content: Some(WireContent::Text(content.clone())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

/// Assemble one chat request from a transcript snapshot, optional tool
/// declarations, and a resolved run configuration.
pub fn build_chat_request(
    messages: &[Message],
    tools: Option<&[ToolSpec]>,
    config: &RunConfig,
    stream: bool,
) -> ChatRequest {
    let tools = tools.and_then(|specs| {
        if specs.is_empty() {
            None
        } else {
            Some(specs.iter().map(|spec| spec.to_wire()).collect())
        }
    });

    let response_format = match config.response_format {
        ResponseFormat::Text => None,
        ResponseFormat::Json => Some(serde_json::json!({"type": "json_object"})),
    };

    ChatRequest {
        model: config.model.clone(),
        messages: messages.iter().map(to_wire_message).collect(),
        stream,
        max_tokens: config.max_tokens,
        temperature: Some(config.temperature),
        tools,
        response_format,
    }
}

/// A pinned, boxed stream of incremental text fragments.
///
/// Lazy, non-restartable, ordered; runs until the remote side signals
/// completion or the transport channel closes.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Decode an HTTP streaming response into a fragment stream.
///
/// The response body is an SSE stream of `data: {...}` chunks terminated by
/// the `data: [DONE]` sentinel. Chunks whose delta carries no text (role
/// announcements, finish markers) are skipped; malformed chunk JSON surfaces
/// as a stream error.
pub fn fragment_stream(response: reqwest::Response) -> FragmentStream {
    let stream = response
        .bytes_stream()
        .eventsource()
        .filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => return Some(Err(Error::stream(format!("SSE decode failed: {e}")))),
            };

            // End-of-stream sentinel is not valid JSON; drop it
            if event.data.trim() == "[DONE]" {
                return None;
            }

            let chunk: ChatChunk = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Some(Err(Error::stream(format!("malformed chunk: {e}"))));
                }
            };

            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|fragment| !fragment.is_empty())
                .map(Ok)
        });

    Box::pin(stream)
}
