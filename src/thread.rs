//! Stateful conversation thread over a remote model
//!
//! [`ChatThread`] owns the transcript, the tool registry, usage counters, the
//! tagged last-result slot, and the cancellation state for at most one active
//! streaming call. All model traffic goes through the [`Transport`] boundary,
//! so tests drive the thread against an in-memory transport.
//!
//! The thread never loops on its own: a completion call that comes back with
//! tool calls executes them, appends their results, and returns
//! [`RunOutcome::ToolResultsPending`]. The caller decides whether to call
//! [`ChatThread::run`] again so the model can see the results.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_thread::{ChatThread, RunOutcome, ThreadOptions};
//!
//! # async fn demo() -> chat_thread::Result<()> {
//! let options = ThreadOptions::builder()
//!     .api_key("sk-...")
//!     .model("gpt-4o-mini")
//!     .build()?;
//! let mut thread = ChatThread::new(options)?;
//!
//! thread.push_system("You are terse.");
//! thread.push_user("What is the capital of France?");
//!
//! while thread.run().await? == RunOutcome::ToolResultsPending {}
//! println!("{}", thread.last_result().as_chat()?.content);
//! # Ok(())
//! # }
//! ```

use crate::config;
use crate::tools::{ToolRegistry, ToolSpec};
use crate::transcript::{ThreadObserver, Transcript};
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    ChatReply, ImageResult, LastResult, Message, ModerationVerdict, ResponseFormat, RunOverrides,
    ThreadOptions, Usage,
};
use crate::wire::{ChatRequest, WireContent, WireMessage, build_chat_request};
use crate::{Error, Result};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Snapshot format version written by [`ChatThread::snapshot`]
pub const SNAPSHOT_VERSION: u64 = 1;

/// How a non-streaming completion call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model answered with plain text; the exchange is complete
    Done,
    /// The model requested tools; their results are appended to the
    /// transcript and the model has not seen them yet
    ToolResultsPending,
}

/// How a streaming call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The model finished; the accumulated text was appended to the transcript
    Completed,
    /// Cancellation was observed; nothing was appended
    Aborted,
}

/// Event delivered to a streaming sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One incremental text fragment, in arrival order
    Token(String),
    /// Terminal sentinel, sent exactly once after the last token on both
    /// completed and aborted streams
    Done,
}

/// Clonable handle that cancels the streaming call active when it fires.
///
/// Safe to share with the sink closure or another task. Firing it when no
/// stream is active is a no-op.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cancellation; the active stream observes it at its next
    /// fragment boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Marker held while a streaming call is in flight; at most one per thread
struct StreamSession {
    flag: Arc<AtomicBool>,
}

/// A stateful conversation thread: transcript, tools, usage, last result,
/// and at most one in-flight streaming call.
pub struct ChatThread {
    options: ThreadOptions,
    transport: Arc<dyn Transport>,
    transcript: Transcript,
    tools: ToolRegistry,
    usage: Usage,
    last_result: LastResult,
    cancelled: Arc<AtomicBool>,
    session: Option<StreamSession>,
}

impl std::fmt::Debug for ChatThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatThread")
            .field("options", &self.options)
            .field("transcript_len", &self.transcript.len())
            .field("tools", &self.tools)
            .field("usage", &self.usage)
            .field("last_result", &self.last_result.kind())
            .field("streaming", &self.session.is_some())
            .finish()
    }
}

impl ChatThread {
    /// Create a thread backed by the HTTP transport described by `options`
    pub fn new(options: ThreadOptions) -> Result<Self> {
        let transport = HttpTransport::new(
            options.base_url.clone(),
            options.api_key.clone(),
            options.timeout,
        )?;
        Ok(Self::with_transport(options, Arc::new(transport)))
    }

    /// Create a thread over a custom transport (tests, proxies, recorders)
    pub fn with_transport(options: ThreadOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            options,
            transport,
            transcript: Transcript::new(),
            tools: ToolRegistry::new(),
            usage: Usage::default(),
            last_result: LastResult::None,
            cancelled: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    pub fn options(&self) -> &ThreadOptions {
        &self.options
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn last_result(&self) -> &LastResult {
        &self.last_result
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Append a system message
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.transcript.push(Message::system(text));
    }

    /// Append a user message
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.transcript.push(Message::user(text));
    }

    /// Append an arbitrary message (assistant priming, tool results replayed
    /// from elsewhere)
    pub fn push_message(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// Append a sequence of messages, preserving their order
    pub fn push_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.transcript.extend(messages);
    }

    /// Replace the transcript wholesale
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.transcript.set_messages(messages);
    }

    /// Attach a passive observer of transcript and stream activity
    pub fn add_observer(&mut self, observer: Arc<dyn ThreadObserver>) {
        self.transcript.add_observer(observer);
    }

    /// Declare a tool without binding a handler (advertise-only)
    pub fn register_tool(&mut self, spec: ToolSpec) {
        self.tools.register(spec);
    }

    /// Declare a tool and bind its handler; last registration wins on a
    /// duplicate name.
    pub fn register_tool_with_handler<F, Fut>(&mut self, spec: ToolSpec, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.tools.register_with_handler(spec, handler);
    }

    /// Declare a tool and bind its handler, failing on a duplicate name
    pub fn register_tool_unique<F, Fut>(&mut self, spec: ToolSpec, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.tools.register_unique(spec, handler)
    }

    /// Run one non-streaming completion over the current transcript
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.run_with(RunOverrides::default()).await
    }

    /// Run one non-streaming completion with per-call overrides.
    ///
    /// The transcript snapshot and all registered tool declarations are sent;
    /// the assistant reply is appended as soon as it arrives. If the reply
    /// requests tool calls they are executed sequentially in the model's
    /// order, each result appended as a tool message, and the call returns
    /// [`RunOutcome::ToolResultsPending`] without contacting the model again.
    ///
    /// # Errors
    ///
    /// Transport and API errors propagate before anything is appended. A tool
    /// name with no bound handler fails with [`Error::UnknownTool`] before any
    /// later call in the batch runs; results already appended stay appended.
    pub async fn run_with(&mut self, overrides: RunOverrides) -> Result<RunOutcome> {
        let config = self.options.resolve(&overrides);
        let specs = self.tools.specs();
        let request = build_chat_request(
            self.transcript.messages(),
            Some(&specs),
            &config,
            false,
        );

        let response = self.transport.complete(request, config.timeout).await?;
        let (reply, usage) = response.into_reply()?;

        // The assistant message lands before tool execution so a mid-batch
        // failure leaves a transcript that already shows what was requested.
        self.transcript.push(Message::assistant_with_calls(
            reply.content.clone(),
            reply.tool_calls.clone(),
        ));
        if let Some(u) = usage {
            self.usage
                .absorb_tokens(u.prompt_tokens, u.completion_tokens, u.total_tokens);
        }

        if reply.tool_calls.is_empty() {
            self.last_result = LastResult::Chat(reply);
            return Ok(RunOutcome::Done);
        }

        log::debug!("executing {} tool call(s)", reply.tool_calls.len());
        for call in &reply.tool_calls {
            let arguments = call.parse_arguments()?;
            let value = self.tools.invoke(&call.name, arguments).await?;
            let content = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            self.transcript.push(Message::tool(call.id.clone(), content));
            self.usage.tool_calls += 1;
        }

        self.last_result = LastResult::Chat(reply);
        Ok(RunOutcome::ToolResultsPending)
    }

    /// Run one streaming completion, delivering fragments to `sink`
    pub async fn run_stream<F>(&mut self, sink: F) -> Result<StreamOutcome>
    where
        F: FnMut(StreamEvent),
    {
        self.run_stream_with(RunOverrides::default(), sink).await
    }

    /// Run one streaming completion with per-call overrides.
    ///
    /// Tools are never advertised on streaming calls. Each fragment is passed
    /// to `sink` as [`StreamEvent::Token`] in arrival order and forwarded to
    /// observers; cancellation is checked before each fragment. On natural
    /// completion the accumulated text is appended to the transcript as one
    /// assistant message and becomes the last result; on abort nothing is
    /// appended and the last result is cleared. The sink receives
    /// [`StreamEvent::Done`] exactly once on both paths.
    ///
    /// # Errors
    ///
    /// [`Error::SessionActive`] if a streaming call is already in flight on
    /// this thread. Mid-stream transport errors propagate without a `Done`
    /// sentinel; already-delivered fragments are not appended.
    pub async fn run_stream_with<F>(
        &mut self,
        overrides: RunOverrides,
        mut sink: F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(StreamEvent),
    {
        if self.session.is_some() {
            return Err(Error::SessionActive);
        }

        let config = self.options.resolve(&overrides);
        let request = build_chat_request(self.transcript.messages(), None, &config, true);

        self.cancelled.store(false, Ordering::SeqCst);
        let mut fragments = self.transport.stream(request, config.timeout).await?;
        self.session = Some(StreamSession {
            flag: self.cancelled.clone(),
        });

        let mut total = String::new();
        let outcome = loop {
            if self.cancelled.load(Ordering::SeqCst) {
                break Ok(StreamOutcome::Aborted);
            }
            match fragments.next().await {
                Some(Ok(fragment)) => {
                    sink(StreamEvent::Token(fragment.clone()));
                    total.push_str(&fragment);
                    self.transcript.notify_fragment(&fragment, &total);
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(StreamOutcome::Completed),
            }
        };

        // The session marker is cleared on every exit path, error included
        self.session = None;

        match outcome {
            Ok(StreamOutcome::Completed) => {
                self.transcript.push(Message::assistant(total.clone()));
                self.last_result = LastResult::Chat(ChatReply {
                    content: total,
                    tool_calls: Vec::new(),
                    model: Some(config.model),
                });
                sink(StreamEvent::Done);
                Ok(StreamOutcome::Completed)
            }
            Ok(StreamOutcome::Aborted) => {
                log::warn!("stream aborted, {} buffered chars discarded", total.len());
                self.last_result = LastResult::None;
                sink(StreamEvent::Done);
                Ok(StreamOutcome::Aborted)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel the active streaming call, if any. Idempotent; a no-op when no
    /// stream is in flight.
    pub fn cancel(&mut self) {
        if let Some(session) = self.session.take() {
            session.flag.store(true, Ordering::SeqCst);
        }
    }

    /// Handle for cancelling the next/active streaming call from the sink
    /// closure or another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancelled.clone(),
        }
    }

    /// One-off vision call: a text prompt plus an image URL, outside the
    /// transcript. Reported token usage is folded into the thread counters.
    pub async fn run_vision(&mut self, prompt: &str, image_url: &str) -> Result<String> {
        let config = self.options.resolve(&RunOverrides::default());
        let message = WireMessage {
            role: "user".to_string(),
            content: Some(WireContent::Parts(vec![
                serde_json::json!({"type": "text", "text": prompt}),
                serde_json::json!({"type": "image_url", "image_url": {"url": image_url}}),
            ])),
            tool_calls: None,
            tool_call_id: None,
        };
        let request = ChatRequest {
            model: config.model,
            messages: vec![message],
            stream: false,
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            tools: None,
            response_format: match config.response_format {
                ResponseFormat::Text => None,
                ResponseFormat::Json => Some(serde_json::json!({"type": "json_object"})),
            },
        };

        let response = self.transport.complete(request, config.timeout).await?;
        let (reply, usage) = response.into_reply()?;
        if let Some(u) = usage {
            self.usage
                .absorb_tokens(u.prompt_tokens, u.completion_tokens, u.total_tokens);
        }

        self.last_result = LastResult::Vision(reply.content.clone());
        Ok(reply.content)
    }

    /// Embedding passthrough for a single input string
    pub async fn run_embedding(&mut self, input: &str) -> Result<Vec<f32>> {
        let vector = self
            .transport
            .embed(config::DEFAULT_EMBEDDING_MODEL, input)
            .await?;
        self.last_result = LastResult::Embedding(vector.clone());
        Ok(vector)
    }

    /// Speech passthrough: synthesize `input` with the given voice
    pub async fn run_speech(&mut self, input: &str, voice: &str) -> Result<Vec<u8>> {
        let audio = self
            .transport
            .speak(config::DEFAULT_SPEECH_MODEL, voice, input)
            .await?;
        self.last_result = LastResult::Speech(audio.clone());
        Ok(audio)
    }

    /// Moderation passthrough for a single input string
    pub async fn run_moderation(&mut self, input: &str) -> Result<ModerationVerdict> {
        let verdict = self.transport.moderate(input).await?;
        self.last_result = LastResult::Moderation(verdict.clone());
        Ok(verdict)
    }

    /// Image-generation passthrough for a single prompt
    pub async fn run_image(&mut self, prompt: &str) -> Result<ImageResult> {
        let image = self
            .transport
            .generate_image(config::DEFAULT_IMAGE_MODEL, prompt)
            .await?;
        self.last_result = LastResult::Image(image.clone());
        Ok(image)
    }

    /// Capture the durable state of this thread as a JSON object.
    ///
    /// Covers the transcript, tool declarations, usage counters, and the last
    /// result. Handlers are code and are not captured; credentials and
    /// transport configuration are deliberately excluded.
    pub fn snapshot(&self) -> Result<Map<String, Value>> {
        let mut state = Map::new();
        state.insert("version".to_string(), SNAPSHOT_VERSION.into());
        state.insert(
            "messages".to_string(),
            serde_json::to_value(self.transcript.messages())?,
        );
        state.insert("tools".to_string(), serde_json::to_value(self.tools.specs())?);
        state.insert("usage".to_string(), serde_json::to_value(self.usage)?);
        state.insert(
            "last_result".to_string(),
            serde_json::to_value(&self.last_result)?,
        );
        Ok(state)
    }

    /// Restore a thread from a snapshot, replacing transcript, tool
    /// declarations, usage, and last result wholesale.
    ///
    /// Handlers already registered under a surviving tool name stay bound;
    /// declarations with no matching handler become advertise-only until
    /// re-registered. Observers are notified of the transcript replacement.
    ///
    /// # Errors
    ///
    /// [`Error::Snapshot`] on an unknown key, an unsupported version, or a
    /// missing/malformed field. Nothing is mutated on failure.
    pub fn restore(&mut self, state: Map<String, Value>) -> Result<()> {
        for key in state.keys() {
            if !matches!(
                key.as_str(),
                "version" | "messages" | "tools" | "usage" | "last_result"
            ) {
                return Err(Error::snapshot(format!("unknown key '{key}'")));
            }
        }

        let version = state
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::snapshot("missing or malformed 'version'"))?;
        if version != SNAPSHOT_VERSION {
            return Err(Error::snapshot(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let messages: Vec<Message> = snapshot_field(&state, "messages")?;
        let specs: Vec<ToolSpec> = snapshot_field(&state, "tools")?;
        let usage: Usage = snapshot_field(&state, "usage")?;
        let last_result: LastResult = snapshot_field(&state, "last_result")?;

        self.transcript.set_messages(messages);
        self.tools.replace_specs(specs);
        self.usage = usage;
        self.last_result = last_result;
        Ok(())
    }
}

fn snapshot_field<T: serde::de::DeserializeOwned>(
    state: &Map<String, Value>,
    key: &str,
) -> Result<T> {
    let value = state
        .get(key)
        .ok_or_else(|| Error::snapshot(format!("missing key '{key}'")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| Error::snapshot(format!("malformed '{key}': {e}")))
}
