//! Anthropic Messages API adapter.
//!
//! Differences from the OpenAI dialect that this adapter absorbs:
//! system messages travel in a top-level `system` field, `max_tokens` is
//! mandatory, auth uses `x-api-key`, and the stream is a sequence of typed
//! events (`message_start`, `content_block_delta`, `message_delta`, ...)
//! instead of uniform chunks.

use super::{
    ChatProvider, Completion, Frame, FrameStream, ProviderFuture, ProviderRequest, UsageInfo,
    http_client, send_checked,
};
use crate::api::streaming::sse_frames;
use crate::config::GatewayConfig;
use crate::error::ProviderError;
use crate::{Message, MessageRole};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is required by the Messages API.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> MessagesRequest<'a> {
    fn new(request: &'a ProviderRequest, stream: bool) -> Self {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages = request
            .messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    MessageRole::System => return None,
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                Some(WireMessage {
                    role,
                    content: &m.content,
                })
            })
            .collect();
        if request.response_format.is_some() {
            debug!("Anthropic has no response_format; relying on the prompt for JSON output");
        }

        Self {
            model: upstream_model_name(&request.model),
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            stream,
        }
    }
}

/// `anthropic/claude-sonnet-4` → `claude-sonnet-4`.
fn upstream_model_name(model: &str) -> &str {
    model.strip_prefix("anthropic/").unwrap_or(model)
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct MessagesResponse {
    id: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

impl From<Usage> for UsageInfo {
    fn from(u: Usage) -> Self {
        let total = match (u.input_tokens, u.output_tokens) {
            (Some(i), Some(o)) => Some(i.saturating_add(o)),
            _ => None,
        };
        UsageInfo {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: total,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StreamMessage,
    },
    ContentBlockDelta {
        delta: ContentDelta,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<MessageDeltaBody>,
        #[serde(default)]
        usage: Option<Usage>,
    },
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct StreamMessage {
    id: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

impl StreamError {
    fn into_provider_error(self) -> ProviderError {
        match self.error_type.as_str() {
            "rate_limit_error" => ProviderError::from_status(429, self.message),
            "overloaded_error" => ProviderError::from_status(529, self.message),
            _ => ProviderError::Upstream(format!("{}: {}", self.error_type, self.message)),
        }
    }
}

/// Parse one Messages API stream event into a frame.
pub(crate) fn parse_stream_event(data: &str) -> Result<Option<Frame>, ProviderError> {
    let event = match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse Anthropic stream event: {e} (data: {data})");
            return Ok(None);
        }
    };

    let frame = match event {
        StreamEvent::MessageStart { message } => Frame {
            id: Some(message.id),
            ..Default::default()
        },
        StreamEvent::ContentBlockDelta {
            delta: ContentDelta::TextDelta { text },
        } => Frame::text(text),
        StreamEvent::MessageDelta { delta, usage } => Frame {
            usage: usage.map(UsageInfo::from),
            finish_reason: delta.and_then(|d| d.stop_reason),
            ..Default::default()
        },
        StreamEvent::Error { error } => return Err(error.into_provider_error()),
        StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => {
            trace!("Ignoring Anthropic stream event");
            return Ok(None);
        }
    };
    Ok(Some(frame))
}

// ── Client ─────────────────────────────────────────────────────────

/// Adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    /// Overall deadline for non-streaming calls.
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(config: &GatewayConfig) -> crate::error::Result<Self> {
        if config.api_key.is_empty() {
            warn!("No Anthropic API key configured");
        }
        Ok(Self {
            client: http_client(config)?,
            endpoint: format!(
                "{}/messages",
                config.effective_base_url().trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
        })
    }

    fn post(&self, body: &MessagesRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }

    async fn chat(&self, request: &ProviderRequest) -> Result<Completion, ProviderError> {
        let body = MessagesRequest::new(request, false);
        debug!(
            "Anthropic request: model={}, messages={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens
        );
        let resp = send_checked(self.post(&body).timeout(self.timeout)).await?;
        let text = resp.text().await?;
        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Decode(format!("failed to parse response: {e}")))?;

        let content: String = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        Ok(Completion {
            id: parsed.id,
            content: Some(content),
            usage: parsed.usage.map(UsageInfo::from),
            finish_reason: parsed.stop_reason,
        })
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<FrameStream, ProviderError> {
        let body = MessagesRequest::new(request, true);
        debug!("Sending streaming Anthropic request: model={}", body.model);
        let resp = send_checked(self.post(&body)).await?;
        Ok(sse_frames(resp, parse_stream_event))
    }
}

impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn complete<'a>(&'a self, request: &'a ProviderRequest) -> ProviderFuture<'a, Completion> {
        Box::pin(self.chat(request))
    }

    fn open_stream<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> ProviderFuture<'a, FrameStream> {
        Box::pin(self.stream(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_hoisted() {
        let req = ProviderRequest {
            model: "anthropic/claude-sonnet-4".into(),
            messages: vec![
                Message::system("Be brief."),
                Message::user("Hi"),
                Message::assistant("Hello"),
                Message::user("Again"),
            ],
            temperature: Some(0.7),
            max_tokens: None,
            response_format: None,
        };
        let json = serde_json::to_value(MessagesRequest::new(&req, true)).unwrap();
        assert_eq!(json["model"], "claude-sonnet-4");
        assert_eq!(json["system"], "Be brief.");
        assert_eq!(json["messages"].as_array().unwrap().len(), 3);
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn usage_total_saturates() {
        let info = UsageInfo::from(Usage {
            input_tokens: Some(u32::MAX),
            output_tokens: Some(5),
        });
        assert_eq!(info.total_tokens, Some(u32::MAX));
        assert_eq!(info.completion_tokens, Some(5));
    }

    #[test]
    fn message_start_carries_id() {
        let frame = parse_stream_event(
            r#"{"type":"message_start","message":{"id":"msg_01","type":"message","role":"assistant","content":[],"usage":{"input_tokens":5}}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(frame.id.as_deref(), Some("msg_01"));
        assert!(frame.delta.is_none());
    }

    #[test]
    fn text_delta_becomes_frame_delta() {
        let frame = parse_stream_event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(frame.delta.as_deref(), Some("Hi"));
    }

    #[test]
    fn ping_and_block_markers_are_ignored() {
        assert!(parse_stream_event(r#"{"type":"ping"}"#).unwrap().is_none());
        assert!(
            parse_stream_event(r#"{"type":"content_block_stop","index":0}"#)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn message_delta_reports_usage() {
        let frame = parse_stream_event(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":12}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(frame.finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(frame.usage.unwrap().completion_tokens, Some(12));
    }

    #[test]
    fn overloaded_error_is_rate_limited() {
        let err = parse_stream_event(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { status: 529, .. }));
    }
}
