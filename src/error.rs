//! Error types for the chat-thread crate

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (missing credential, missing model, bad URL)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Protocol-level error returned by the remote API
    #[error("API error: {0}")]
    Api(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// The model requested a tool that has no registered handler.
    ///
    /// Fatal to the completion run in which it occurs: no further tool
    /// calls from the same batch are attempted.
    #[error("unknown tool: no handler registered for '{0}'")]
    UnknownTool(String),

    /// A tool spec was registered under a name that is already taken
    /// (strict registration only; plain registration overwrites)
    #[error("duplicate tool registration: '{0}'")]
    DuplicateTool(String),

    /// Tool handler failure
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// A streaming call was issued while another stream was still open
    #[error("a streaming session is already active on this thread")]
    SessionActive,

    /// A typed LastResult accessor was used on the wrong variant
    #[error("last result is {actual}, not {expected}")]
    ResultKind {
        /// The variant the accessor expected
        expected: &'static str,
        /// The variant actually stored
        actual: &'static str,
    },

    /// Snapshot/restore failure (unknown key, malformed field)
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Error::Snapshot(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}
