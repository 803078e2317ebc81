//! Environment-based configuration helpers
//!
//! The options builder falls back to these when a field is not set
//! explicitly. Nothing here is required: every value can be supplied
//! programmatically through [`crate::ThreadOptions::builder`].

use std::env;

/// Default endpoint when neither the builder nor the environment names one
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "CHAT_THREAD_API_KEY";

/// Environment variable holding the endpoint base URL
pub const ENV_BASE_URL: &str = "CHAT_THREAD_BASE_URL";

/// Environment variable holding the model name
pub const ENV_MODEL: &str = "CHAT_THREAD_MODEL";

/// Default model for the embedding passthrough
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default model for the speech passthrough
pub const DEFAULT_SPEECH_MODEL: &str = "tts-1";

/// Default model for the image-generation passthrough
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// API key from the environment, if set and non-empty
pub fn env_api_key() -> Option<String> {
    non_empty(env::var(ENV_API_KEY).ok())
}

/// Base URL from the environment, if set and non-empty
pub fn env_base_url() -> Option<String> {
    non_empty(env::var(ENV_BASE_URL).ok())
}

/// Model name from the environment, if set and non-empty
pub fn env_model() -> Option<String> {
    non_empty(env::var(ENV_MODEL).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
