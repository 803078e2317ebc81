//! # chat-thread
//!
//! A stateful conversation thread over OpenAI-compatible chat APIs.
//!
//! ## Overview
//!
//! The crate centers on [`ChatThread`]: one thread owns an ordered transcript,
//! a tool registry, monotonically accumulating usage counters, and a tagged
//! last-result slot. Everything the model sees is derived from the transcript;
//! everything the model answers lands back in it.
//!
//! ## Key Features
//!
//! - **Transcript as source of truth**: append-only message history, replayed
//!   in full on every call
//! - **Explicit tool round-trips**: the thread executes requested tools and
//!   appends their results, but never re-contacts the model on its own
//! - **Streaming with cooperative cancellation**: fragments delivered in
//!   order, one stream per thread, cancel observed at fragment boundaries
//! - **Tagged results**: [`LastResult`] keeps one variant per call kind, with
//!   typed accessors that fail loudly on the wrong shape
//! - **Snapshot/restore**: durable thread state as plain JSON, strict about
//!   unknown keys
//! - **Passthroughs**: vision, embeddings, moderation, speech, and image
//!   generation on the same thread
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_thread::{ChatThread, RunOutcome, ThreadOptions, ToolSpec};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ThreadOptions::builder()
//!         .api_key(std::env::var("CHAT_THREAD_API_KEY")?)
//!         .model("gpt-4o-mini")
//!         .build()?;
//!     let mut thread = ChatThread::new(options)?;
//!
//!     thread.register_tool_with_handler(
//!         ToolSpec::new("get_time", "Current UTC time").param("tz", "string"),
//!         |_args| async move { Ok(json!({"time": "12:00Z"})) },
//!     );
//!
//!     thread.push_user("What time is it in UTC?");
//!     while thread.run().await? == RunOutcome::ToolResultsPending {}
//!
//!     println!("{}", thread.last_result().as_chat()?.content);
//!     Ok(())
//! }
//! ```

mod config;

/// Error types and the crate-wide `Result` alias
mod error;

/// Conversation thread core: runners, cancellation, passthroughs, snapshots
mod thread;

/// Tool declarations, handlers, and the registry
mod tools;

/// Ordered transcript and the passive observer trait
mod transcript;

/// Transport boundary to the remote model
mod transport;

/// Conversation data model: messages, options, usage, last result
mod types;

/// Wire payloads, request builder, and the SSE fragment decoder
mod wire;

/// Opt-in retry with exponential backoff; the core never retries on its own
pub mod retry;

pub use config::{
    DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, DEFAULT_IMAGE_MODEL, DEFAULT_SPEECH_MODEL,
    ENV_API_KEY, ENV_BASE_URL, ENV_MODEL,
};
pub use error::{Error, Result};
pub use thread::{
    CancelHandle, ChatThread, RunOutcome, SNAPSHOT_VERSION, StreamEvent, StreamOutcome,
};
pub use tools::{ToolHandler, ToolRegistry, ToolSpec};
pub use transcript::{ThreadObserver, Transcript};
pub use transport::{HttpTransport, Transport};
pub use types::{
    ChatReply, ImageResult, LastResult, Message, ModerationVerdict, ResponseFormat, Role,
    RunConfig, RunOverrides, ThreadOptions, ThreadOptionsBuilder, ToolCall, Usage,
};
pub use wire::{
    ChatChoice, ChatRequest, ChatResponse, FragmentStream, WireContent, WireFunction, WireMessage,
    WireToolCall, WireUsage, build_chat_request,
};
