//! Shared test transport: scripted replies instead of a live endpoint

#![allow(dead_code)]

use async_trait::async_trait;
use chat_thread::{
    ChatRequest, ChatResponse, Error, FragmentStream, ImageResult, ModerationVerdict, Result,
    ThreadOptions, Transport,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Thread options pointing at nothing; all traffic goes through the mock
pub fn test_options() -> ThreadOptions {
    ThreadOptions::builder()
        .api_key("test-key")
        .model("test-model")
        .base_url("http://localhost:0/v1")
        .build()
        .unwrap()
}

/// In-memory transport that replays scripted responses and records every
/// request it sees.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Value>>,
    scripts: Mutex<VecDeque<Vec<Result<String>>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub embedding: Mutex<Option<Vec<f32>>>,
    pub verdict: Mutex<Option<ModerationVerdict>>,
    pub audio: Mutex<Option<Vec<u8>>>,
    pub image: Mutex<Option<ImageResult>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain-text assistant reply with fixed usage (10/5/15)
    pub fn queue_text(&self, content: &str) {
        self.queue_value(json!({
            "model": "test-model",
            "choices": [{
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }));
    }

    /// Queue an assistant reply requesting the given tool calls, in order
    pub fn queue_tool_calls(&self, calls: &[(&str, &str, &str)]) {
        let wire_calls: Vec<Value> = calls
            .iter()
            .map(|(id, name, args)| {
                json!({
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": args}
                })
            })
            .collect();
        self.queue_value(json!({
            "model": "test-model",
            "choices": [{
                "message": {"role": "assistant", "content": "", "tool_calls": wire_calls},
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }));
    }

    /// Queue a raw response payload
    pub fn queue_value(&self, value: Value) {
        self.replies.lock().unwrap().push_back(value);
    }

    /// Queue one streaming call's fragment script
    pub fn queue_stream(&self, fragments: Vec<Result<String>>) {
        self.scripts.lock().unwrap().push_back(fragments);
    }

    /// Queue a streaming call that yields these text fragments and ends
    pub fn queue_stream_text(&self, fragments: &[&str]) {
        self.queue_stream(fragments.iter().map(|f| Ok(f.to_string())).collect());
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The most recent request sent through this transport
    pub fn last_request(&self) -> ChatRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .expect("no request recorded")
            .clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn complete(&self, request: ChatRequest, _timeout: u64) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request);
        let value = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::api("no scripted reply"))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn stream(&self, request: ChatRequest, _timeout: u64) -> Result<FragmentStream> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::stream("no scripted stream"))?;
        Ok(Box::pin(futures::stream::iter(script)))
    }

    async fn embed(&self, _model: &str, _input: &str) -> Result<Vec<f32>> {
        self.embedding
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::api("no scripted embedding"))
    }

    async fn moderate(&self, _input: &str) -> Result<ModerationVerdict> {
        self.verdict
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::api("no scripted verdict"))
    }

    async fn speak(&self, _model: &str, _voice: &str, _input: &str) -> Result<Vec<u8>> {
        self.audio
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::api("no scripted audio"))
    }

    async fn generate_image(&self, _model: &str, _prompt: &str) -> Result<ImageResult> {
        self.image
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::api("no scripted image"))
    }
}
