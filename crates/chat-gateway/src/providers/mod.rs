//! Upstream provider adapters.
//!
//! Every upstream speaks its own dialect. An adapter implements
//! [`ChatProvider`] and translates a [`ProviderRequest`] into that dialect,
//! returning either a whole [`Completion`] or a [`FrameStream`] of
//! incremental [`Frame`]s. The gateway only ever sees these normalized types.
//!
//! | Adapter | Upstream |
//! |---------|----------|
//! | [`OpenAiCompatProvider`] | OpenAI-compatible `/chat/completions` (OpenRouter, OpenAI, local servers) |
//! | [`AnthropicProvider`] | Anthropic Messages API `/messages` |

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatProvider;

use crate::Message;
use crate::config::{GatewayConfig, ProviderKind};
use crate::error::ProviderError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`ChatProvider`] methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Frames of one streaming response, in network-arrival order.
pub type FrameStream = BoxStream<'static, Result<Frame, ProviderError>>;

/// Parameters for one upstream call, after alias resolution and defaults.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Canonical model id.
    pub model: String,
    pub messages: Vec<Message>,
    /// `None` means the field is not sent at all.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub response_format: Option<ResponseFormat>,
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema,
}

/// Structured-output request forwarded to providers that support it.
#[derive(Serialize, Clone, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaSpec>,
}

#[derive(Serialize, Clone, Debug)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseFormat {
    pub fn json_schema(schema: &serde_json::Value) -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonSchema,
            json_schema: Some(JsonSchemaSpec {
                name: "output".into(),
                schema: schema.clone(),
            }),
        }
    }
}

/// Token usage as reported by the upstream.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// One unit pushed by the upstream during a streaming response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Response id, if this frame carries one.
    pub id: Option<String>,
    /// Incremental text.
    pub delta: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

impl Frame {
    /// A frame carrying only a text delta.
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A complete, non-streamed response.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub id: Option<String>,
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// An upstream chat-completion provider.
///
/// `open_stream` resolves once the upstream has accepted the request (HTTP
/// status checked); frames are then pulled from the returned stream. The
/// gateway retries the returned futures, never the stream itself.
pub trait ChatProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn complete<'a>(&'a self, request: &'a ProviderRequest) -> ProviderFuture<'a, Completion>;

    fn open_stream<'a>(&'a self, request: &'a ProviderRequest)
    -> ProviderFuture<'a, FrameStream>;
}

/// Build the adapter selected by `config.provider`.
pub fn from_config(config: &GatewayConfig) -> crate::error::Result<Arc<dyn ChatProvider>> {
    let provider: Arc<dyn ChatProvider> = match config.provider {
        ProviderKind::OpenAiCompatible => Arc::new(OpenAiCompatProvider::new(config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(config)?),
    };
    Ok(provider)
}

/// Shared `reqwest` client construction for the adapters.
///
/// The client only bounds connecting and each individual read, so a stream
/// that keeps producing data is never cut off. Non-streaming calls add an
/// overall deadline per request with `RequestBuilder::timeout`.
pub(crate) fn http_client(config: &GatewayConfig) -> crate::error::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("chat-gateway/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(config.timeout())
        .read_timeout(config.timeout())
        .build()
        .map_err(|e| crate::GatewayError::Config(format!("failed to build HTTP client: {e}")))
}

/// Send a request and turn a non-success status into a [`ProviderError`].
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let resp = request.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), body))
}
