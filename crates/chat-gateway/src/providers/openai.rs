//! OpenAI-compatible chat completions (OpenRouter by default).

use super::{
    ChatProvider, Completion, Frame, FrameStream, ProviderFuture, ProviderRequest,
    ResponseFormat, UsageInfo, http_client, send_checked,
};
use crate::Message;
use crate::api::streaming::sse_frames;
use crate::config::GatewayConfig;
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Serialize, Debug)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a ResponseFormat>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> WireRequest<'a> {
    fn new(request: &'a ProviderRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.response_format.as_ref(),
            stream,
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    id: Option<String>,
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ApiErrorResponse {
    /// OpenRouter reports some upstream failures inside a 200 body.
    fn into_provider_error(self) -> ProviderError {
        match self
            .code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
        {
            Some(code) => ProviderError::from_status(code, self.message),
            None => ProviderError::Upstream(self.message),
        }
    }
}

/// Raw SSE data chunk.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    id: Option<String>,
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageInfo>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse a single SSE `data:` payload into a frame.
///
/// Undecodable chunks are logged and skipped; an in-band `error` object ends
/// the stream with that error.
pub(crate) fn parse_stream_data(data: &str) -> Result<Option<Frame>, ProviderError> {
    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e} (data: {data})");
            return Ok(None);
        }
    };

    if let Some(err) = chunk.error {
        return Err(err.into_provider_error());
    }

    let mut frame = Frame {
        id: chunk.id,
        usage: chunk.usage,
        ..Default::default()
    };
    if let Some(choice) = chunk.choices.and_then(|c| c.into_iter().next()) {
        frame.delta = choice.delta.and_then(|d| d.content);
        if choice.finish_reason.is_some() {
            trace!("Stream finish_reason: {:?}", choice.finish_reason);
        }
        frame.finish_reason = choice.finish_reason;
    }
    Ok(Some(frame))
}

// ── Client ─────────────────────────────────────────────────────────

/// Adapter for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    referer: String,
    title: String,
    /// Overall deadline for non-streaming calls.
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(config: &GatewayConfig) -> crate::error::Result<Self> {
        if config.api_key.is_empty() {
            warn!("No API key configured; requests are sent unauthenticated");
        }
        Ok(Self {
            client: http_client(config)?,
            endpoint: format!(
                "{}/chat/completions",
                config.effective_base_url().trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
            timeout: config.timeout(),
        })
    }

    fn post(&self, body: &WireRequest<'_>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        builder
    }

    async fn chat(&self, request: &ProviderRequest) -> Result<Completion, ProviderError> {
        let body = WireRequest::new(request, false);
        debug!(
            "LLM request: model={}, messages={}, max_tokens={:?}, temp={:?}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = send_checked(self.post(&body).timeout(self.timeout)).await?;
        let text = resp.text().await?;
        debug!(
            "LLM response in {:.1}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            text.len()
        );

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Decode(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(err.into_provider_error());
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        if choice.is_none() {
            debug!("LLM output: empty (no choices)");
        }
        let (content, finish_reason) = match choice {
            Some(c) => (c.message.content, c.finish_reason),
            None => (None, None),
        };

        Ok(Completion {
            id: parsed.id,
            content,
            usage: parsed.usage,
            finish_reason,
        })
    }

    async fn stream(&self, request: &ProviderRequest) -> Result<FrameStream, ProviderError> {
        let body = WireRequest::new(request, true);
        debug!(
            "Sending streaming chat request: model={}, messages={}",
            body.model,
            body.messages.len()
        );
        let resp = send_checked(self.post(&body)).await?;
        Ok(sse_frames(resp, parse_stream_data))
    }
}

impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
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
