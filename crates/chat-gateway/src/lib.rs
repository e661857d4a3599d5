//! Streaming LLM gateway: one request/response contract over heterogeneous
//! chat-completion upstreams.
//!
//! `chat-gateway` takes a [`ChatRequest`], resolves the model through the
//! [`ModelCatalog`](catalog::ModelCatalog), dispatches to a
//! [`ChatProvider`](providers::ChatProvider) under a bounded
//! [`RetryPolicy`](api::retry::RetryPolicy), and returns a normalized
//! [`ChatResponse`]. Streaming calls additionally push progress to a
//! [`StreamSink`](sink::StreamSink), either as growing text or as complete
//! JSON objects pulled out of the stream as soon as they close.
//!
//! # Getting started
//!
//! ```ignore
//! use chat_gateway::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> chat_gateway::Result<()> {
//!     let gateway = ChatGateway::new(GatewayConfig::from_env()?)?;
//!
//!     let request = ChatRequest::prompt("4o-mini", "Be helpful", "List three colors as JSON objects.");
//!     let sink = FnSink::new(|update: &StreamUpdate<'_>| {
//!         if let StreamUpdate::Json(value) = update {
//!             println!("{value}");
//!         }
//!     });
//!
//!     let response = gateway.chat_stream(&request, StreamMode::Json, &sink).await?;
//!     println!("used {} tokens", response.total_tokens());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`gateway`] | [`ChatGateway`](gateway::ChatGateway), the entry point |
//! | [`providers`] | [`ChatProvider`](providers::ChatProvider) trait, OpenAI-compatible and Anthropic adapters |
//! | [`stream`] | Stream modes, text accumulation, incremental JSON extraction |
//! | [`sink`] | [`StreamSink`](sink::StreamSink) and stock sinks |
//! | [`api`] | SSE decoding, retry with backoff, trace ids |
//! | [`catalog`] | Model aliases and reasoning-model classification |
//! | [`tokens`] | Heuristic token estimation |
//! | [`config`] | [`GatewayConfig`](config::GatewayConfig) and its loaders |
//! | [`error`] | [`GatewayError`] and [`ProviderError`] |

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod prelude;
pub mod providers;
pub mod sink;
pub mod stream;
pub mod tokens;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::{GatewayError, ProviderError, Result};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// Model used when a request leaves its model id empty.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Sampling temperature for non-reasoning models.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`, for use as a request's output schema.
///
/// # Example
///
/// ```
/// use chat_gateway::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Color {
///     name: String,
///     #[serde(default)]
///     hex: Option<String>,
/// }
///
/// let schema = json_schema_for::<Color>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"name".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Request types ──────────────────────────────────────────────────

/// The conversation of a request: a system/user pair or explicit messages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageInput {
    Messages {
        messages: Vec<Message>,
    },
    Prompt {
        #[serde(default)]
        system: String,
        user: String,
    },
}

/// A caller's chat request, before alias resolution and defaults.
///
/// Deserializes from either shape:
///
/// ```
/// use chat_gateway::ChatRequest;
///
/// let a: ChatRequest = serde_json::from_str(
///     r#"{"model":"4o","system":"Be helpful","user":"Hi"}"#,
/// ).unwrap();
/// let b: ChatRequest = serde_json::from_str(
///     r#"{"model":"4o","messages":[{"role":"user","content":"Hi"}]}"#,
/// ).unwrap();
/// assert_eq!(a.messages().len(), 2);
/// assert_eq!(b.messages().len(), 1);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatRequest {
    /// Model id or alias. Empty means the configured default.
    #[serde(default)]
    pub model: String,
    #[serde(flatten)]
    pub input: MessageInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// JSON Schema that streamed JSON objects must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

impl ChatRequest {
    /// System prompt plus one user turn.
    pub fn prompt(
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self::from_input(
            model,
            MessageInput::Prompt {
                system: system.into(),
                user: user.into(),
            },
        )
    }

    /// An explicit ordered message list.
    pub fn with_messages(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self::from_input(model, MessageInput::Messages { messages })
    }

    fn from_input(model: impl Into<String>, input: MessageInput) -> Self {
        Self {
            model: model.into(),
            input,
            temperature: None,
            max_tokens: None,
            output_schema: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Use the JSON Schema of `T` as the output schema.
    pub fn with_output_schema_for<T: JsonSchema>(self) -> Self {
        self.with_output_schema(json_schema_for::<T>())
    }

    /// The resolved message list. An empty system prompt is dropped.
    pub fn messages(&self) -> Vec<Message> {
        match &self.input {
            MessageInput::Messages { messages } => messages.clone(),
            MessageInput::Prompt { system, user } => {
                let mut out = Vec::with_capacity(2);
                if !system.is_empty() {
                    out.push(Message::system(system.as_str()));
                }
                out.push(Message::user(user.as_str()));
                out
            }
        }
    }

    /// All message contents concatenated, for input-token estimation.
    pub fn prompt_text(&self) -> String {
        match &self.input {
            MessageInput::Messages { messages } => {
                messages.iter().map(|m| m.content.as_str()).collect()
            }
            MessageInput::Prompt { system, user } => format!("{system}{user}"),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Normalized response returned by every gateway call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub id: Option<String>,
    pub object: String,
    /// Unix seconds.
    pub created: i64,
    /// Canonical model id the call was dispatched to.
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResponseMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Token accounting. Streaming output counts are one per delta, so they
/// approximate rather than match upstream tokenization.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ChatResponse {
    /// A single-choice assistant response finished with `"stop"`.
    pub fn assistant(
        id: Option<String>,
        model: impl Into<String>,
        content: impl Into<String>,
        usage: Usage,
    ) -> Self {
        Self {
            id,
            object: "chat.completion".into(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: MessageRole::Assistant,
                    content: content.into(),
                },
                finish_reason: "stop".into(),
            }],
            usage,
        }
    }

    /// Content of the first choice, or `""`.
    pub fn text(&self) -> &str {
        self.choices
            .first()
            .map_or("", |c| c.message.content.as_str())
    }

    pub fn total_tokens(&self) -> u32 {
        self.usage.input_tokens + self.usage.output_tokens
    }
}
