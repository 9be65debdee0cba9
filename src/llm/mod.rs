//! LLM chat client traits and implementations.
//!
//! Every stage of the harness talks to the model the same way: send an
//! ordered list of role-tagged messages, receive one text reply. The
//! [`ChatModel`] trait captures exactly that, so the probing, disambiguation
//! and graph-extraction stages can be exercised against in-memory fakes.
//!
//! # Clients
//!
//! - [`ChatCompletionsClient`]: OpenAI-compatible Chat Completions API
//!   (`/v1/chat/completions`), non-streaming.
//!
//! Transient failures are retried by [`RetryPolicy`] at the call site, not
//! inside the client.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_kbc_probe::llm::{ChatCompletionsClient, ChatMessage, ChatModel, ChatRequest, LlmSettings};
//!
//! let client = ChatCompletionsClient::new(settings)?;
//! let reply = client
//!     .complete(&ChatRequest::new(vec![ChatMessage::user("Who founded Wikidata?")]))
//!     .await?;
//! ```

pub mod chat_completions;
pub mod provider;
pub mod retry;

pub use chat_completions::ChatCompletionsClient;
pub use provider::Provider;
pub use retry::{Backoff, RetryPolicy};

use std::time::Duration;

use crate::error::LlmError;

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Default model identifier (e.g., `gpt-4`, `llama3.1:latest`).
    pub model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single-turn chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Conversation messages, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Model override; the client's default model is used when `None`.
    pub model: Option<String>,
}

impl ChatRequest {
    /// Create a request with temperature 1.0 and the client's default model.
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 1.0,
            model: None,
        }
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the model for this request.
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Trait for chat models: send messages, receive one text reply.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync + std::fmt::Debug {
    /// Complete the conversation and return the assistant's text.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`]; callers decide whether to retry with
    /// [`LlmError::is_transient`].
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}
