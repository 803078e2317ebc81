//! Ordered conversation transcript and passive observers
//!
//! The transcript is the single source of truth for what is replayed to the
//! model: insertion order is conversation order. It grows by append only and
//! never shrinks except by wholesale replacement.

use crate::types::Message;
use std::sync::Arc;

/// Passive observer of thread activity.
///
/// Observers are purely observational: they are notified after the fact and
/// can never influence control flow. Bindings to reactive frameworks are
/// adapters implementing this trait. All callbacks default to no-ops, so an
/// adapter implements only what it needs.
pub trait ThreadObserver: Send + Sync {
    /// Called after every transcript mutation with the new snapshot
    fn on_append(&self, _transcript: &[Message]) {}

    /// Called for each incremental fragment of a streaming response
    fn on_fragment(&self, _fragment: &str) {}

    /// Called with the running concatenation after each fragment
    fn on_stream_text(&self, _total: &str) {}
}

/// Ordered, append-only sequence of conversation messages
#[derive(Default)]
pub struct Transcript {
    messages: Vec<Message>,
    observers: Vec<Arc<dyn ThreadObserver>>,
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("messages", &self.messages)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript from an initial message sequence
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            observers: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append one message to the end. This is the single mutation primitive:
    /// user text, assistant replies, and tool results all land here.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.notify_append();
    }

    /// Append a sequence of messages, preserving their order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.notify_append();
    }

    /// Replace the transcript wholesale (clear + append, not additive)
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        self.messages.extend(messages);
        self.notify_append();
    }

    /// Attach a passive observer; zero or more may be attached
    pub fn add_observer(&mut self, observer: Arc<dyn ThreadObserver>) {
        self.observers.push(observer);
    }

    fn notify_append(&self) {
        for observer in &self.observers {
            observer.on_append(&self.messages);
        }
    }

    /// Forward one streaming fragment and the running total to observers
    pub(crate) fn notify_fragment(&self, fragment: &str, total: &str) {
        for observer in &self.observers {
            observer.on_fragment(fragment);
            observer.on_stream_text(total);
        }
    }
}
