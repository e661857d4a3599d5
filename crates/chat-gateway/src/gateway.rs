//! The gateway: the one entry point callers use.
//!
//! A call goes through the same steps whichever method is used:
//!
//! 1. [`prepare`](ChatGateway::prepare): resolve the model alias, build the
//!    message list, decide temperature and estimate input tokens.
//! 2. Dispatch through the [`RetryPolicy`]. For streaming calls only the
//!    stream opening is retried; once frames flow, a failure ends the call.
//! 3. Normalize the result into a single-choice [`ChatResponse`].
//!
//! # Example
//!
//! ```ignore
//! let gateway = ChatGateway::new(GatewayConfig::from_env()?)?;
//! let request = ChatRequest::prompt("4o", "Be helpful", "Hi, please help.");
//!
//! let response = gateway.chat(&request).await?;
//! println!("{}", response.text());
//!
//! let sink = FnSink::new(|u: &StreamUpdate<'_>| {
//!     if let StreamUpdate::Text { delta, .. } = u {
//!         print!("{delta}");
//!     }
//! });
//! gateway.chat_stream(&request, StreamMode::Text, &sink).await?;
//! ```

use crate::api::retry::RetryPolicy;
use crate::api::tracing::{UsageTotals, UsageTracker, generate_span_id, generate_trace_id};
use crate::catalog::ModelCatalog;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::providers::{self, ChatProvider, FrameStream, ProviderRequest, ResponseFormat};
use crate::sink::StreamSink;
use crate::stream::{StreamMode, StreamState};
use crate::tokens::TokenEstimator;
use crate::{ChatRequest, ChatResponse, Usage};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info_span};

/// A request resolved into upstream parameters.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub params: ProviderRequest,
    /// Heuristic estimate over all message contents.
    pub input_tokens: u32,
}

/// Normalizes chat calls across providers. Cheap to share: all methods take
/// `&self`, and each call owns its own streaming state.
pub struct ChatGateway {
    config: GatewayConfig,
    provider: Arc<dyn ChatProvider>,
    catalog: ModelCatalog,
    estimator: TokenEstimator,
    retry: RetryPolicy,
    usage: UsageTracker,
}

impl std::fmt::Debug for ChatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGateway")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatGateway {
    /// Build a gateway talking to the provider selected in `config`.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let provider = providers::from_config(&config)?;
        Ok(Self::with_provider(config, provider))
    }

    /// Build a gateway around an existing provider.
    pub fn with_provider(config: GatewayConfig, provider: Arc<dyn ChatProvider>) -> Self {
        let catalog = ModelCatalog::new().with_aliases(config.aliases.clone());
        let estimator = TokenEstimator::new(config.chars_per_token);
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            config,
            provider,
            catalog,
            estimator,
            retry,
            usage: UsageTracker::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Token usage summed over every successful call so far.
    pub fn usage(&self) -> UsageTotals {
        self.usage.totals()
    }

    /// Resolve `request` into upstream parameters without sending anything.
    pub fn prepare(&self, request: &ChatRequest) -> Result<PreparedCall> {
        let requested = if request.model.trim().is_empty() {
            self.config.default_model.as_str()
        } else {
            request.model.as_str()
        };
        let model = self.catalog.resolve(requested);

        let messages = request.messages();
        if messages.is_empty() {
            return Err(GatewayError::EmptyConversation);
        }

        let temperature = if self.catalog.is_reasoning_model(&model) {
            if request.temperature.is_some() {
                debug!("Dropping temperature override for reasoning model {model}");
            }
            None
        } else {
            Some(request.temperature.unwrap_or(self.config.default_temperature))
        };

        let input_tokens = self.estimator.estimate(&request.prompt_text());

        Ok(PreparedCall {
            params: ProviderRequest {
                model,
                messages,
                temperature,
                max_tokens: request.max_tokens.or(self.config.default_max_tokens),
                response_format: request.output_schema.as_ref().map(ResponseFormat::json_schema),
            },
            input_tokens,
        })
    }

    /// Non-streaming call.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let call = self.prepare(request)?;
        let trace_id = generate_trace_id();
        let span = info_span!("chat", trace_id = %trace_id, model = %call.params.model, stream = false);
        self.dispatch_complete(call, &trace_id)
            .instrument(span)
            .await
    }

    /// Streaming call; `sink` sees updates as frames arrive.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        mode: StreamMode,
        sink: &dyn StreamSink,
    ) -> Result<ChatResponse> {
        self.stream_with(request, mode, sink, None).await
    }

    /// Like [`chat_stream`](Self::chat_stream) with the mode given by name.
    ///
    /// An unknown mode fails with [`GatewayError::UnsupportedStreamMode`]
    /// before anything is sent upstream.
    pub async fn chat_stream_named(
        &self,
        request: &ChatRequest,
        mode: &str,
        sink: &dyn StreamSink,
    ) -> Result<ChatResponse> {
        let mode: StreamMode = mode.parse()?;
        self.chat_stream(request, mode, sink).await
    }

    /// Streaming call that stops with [`GatewayError::Cancelled`] once
    /// `cancel` turns `true`. Checked before dispatch and between frames.
    pub async fn chat_stream_cancellable(
        &self,
        request: &ChatRequest,
        mode: StreamMode,
        sink: &dyn StreamSink,
        cancel: watch::Receiver<bool>,
    ) -> Result<ChatResponse> {
        self.stream_with(request, mode, sink, Some(cancel)).await
    }

    async fn stream_with(
        &self,
        request: &ChatRequest,
        mode: StreamMode,
        sink: &dyn StreamSink,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ChatResponse> {
        let call = self.prepare(request)?;
        let state = StreamState::new(mode, request.output_schema.as_ref())?;
        let trace_id = generate_trace_id();
        let span = info_span!("chat", trace_id = %trace_id, model = %call.params.model, stream = %mode);
        self.dispatch_stream(call, state, sink, cancel, &trace_id)
            .instrument(span)
            .await
    }

    async fn dispatch_complete(&self, call: PreparedCall, trace_id: &str) -> Result<ChatResponse> {
        let params = &call.params;
        let mut attempt = 0;
        let completion = self
            .retry
            .execute(|| {
                attempt += 1;
                debug!(
                    "Dispatching to {} [{}]",
                    self.provider.name(),
                    generate_span_id(trace_id, attempt)
                );
                self.provider.complete(params)
            })
            .await?;

        let content = completion.content.unwrap_or_default();
        let output_tokens = completion
            .usage
            .as_ref()
            .and_then(|u| u.completion_tokens)
            .unwrap_or_else(|| self.estimator.estimate(&content));

        Ok(self.respond(completion.id, call, content, output_tokens))
    }

    async fn dispatch_stream(
        &self,
        call: PreparedCall,
        mut state: StreamState,
        sink: &dyn StreamSink,
        mut cancel: Option<watch::Receiver<bool>>,
        trace_id: &str,
    ) -> Result<ChatResponse> {
        if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(GatewayError::Cancelled);
        }

        let params = &call.params;
        let mut attempt = 0;
        let mut frames: FrameStream = self
            .retry
            .execute(|| {
                attempt += 1;
                debug!(
                    "Opening {} stream via {} [{}]",
                    state.mode(),
                    self.provider.name(),
                    generate_span_id(trace_id, attempt)
                );
                self.provider.open_stream(params)
            })
            .await?;

        loop {
            let next = match cancel.as_mut() {
                Some(rx) => tokio::select! {
                    biased;
                    _ = cancelled(rx) => {
                        debug!("Stream cancelled after {} chars", state.accumulated_text().len());
                        return Err(GatewayError::Cancelled);
                    }
                    next = frames.next() => next,
                },
                None => frames.next().await,
            };
            let Some(frame) = next else { break };
            match frame {
                Ok(frame) => state.apply(&frame, sink),
                Err(e) => {
                    // Deltas already went to the sink; retrying would repeat them.
                    error!(
                        "Stream failed mid-response after {} chars: {e}",
                        state.accumulated_text().len()
                    );
                    return Err(GatewayError::Provider(e));
                }
            }
        }

        let outcome = state.finish();
        Ok(self.respond(
            outcome.response_id,
            call,
            outcome.text,
            outcome.output_tokens,
        ))
    }

    fn respond(
        &self,
        id: Option<String>,
        call: PreparedCall,
        content: String,
        output_tokens: u32,
    ) -> ChatResponse {
        let usage = Usage {
            input_tokens: call.input_tokens,
            output_tokens,
        };
        self.usage.record(usage.input_tokens, usage.output_tokens);
        debug!(
            "Response: id={:?}, {} chars, tokens in={} out={}",
            id,
            content.len(),
            usage.input_tokens,
            usage.output_tokens
        );
        ChatResponse::assistant(id, call.params.model, content, usage)
    }
}

/// Resolves once the flag is `true`; never, if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryConfig;
    use crate::error::ProviderError;
    use crate::providers::{Completion, Frame, ProviderFuture, UsageInfo};
    use crate::sink::{ChannelSink, FnSink, NoopSink, StreamItem, StreamUpdate};
    use crate::{Message, MessageRole};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory provider replaying a fixed script.
    #[derive(Default)]
    struct ScriptedProvider {
        calls: AtomicU32,
        requests: Mutex<Vec<ProviderRequest>>,
        /// Errors returned by the first calls, in order.
        failures: Mutex<VecDeque<ProviderError>>,
        frames: Vec<Frame>,
        /// Fail the stream after this many frames.
        break_after: Option<usize>,
        /// Never end the stream after the scripted frames.
        hang: bool,
        completion: Completion,
    }

    impl ScriptedProvider {
        fn streaming(deltas: &[&str]) -> Self {
            Self {
                frames: deltas.iter().map(|d| Frame::text(*d)).collect(),
                ..Default::default()
            }
        }

        fn failing_first(self, errors: Vec<ProviderError>) -> Self {
            *self.failures.lock().unwrap() = errors.into();
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> ProviderRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }

        fn begin(&self, request: &ProviderRequest) -> std::result::Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete<'a>(&'a self, request: &'a ProviderRequest) -> ProviderFuture<'a, Completion> {
            Box::pin(async move {
                self.begin(request)?;
                Ok::<_, ProviderError>(self.completion.clone())
            })
        }

        fn open_stream<'a>(
            &'a self,
            request: &'a ProviderRequest,
        ) -> ProviderFuture<'a, FrameStream> {
            Box::pin(async move {
                self.begin(request)?;
                let mut items: Vec<std::result::Result<Frame, ProviderError>> =
                    self.frames.iter().cloned().map(Ok).collect();
                if let Some(n) = self.break_after {
                    items.truncate(n);
                    items.push(Err(ProviderError::Transport("connection reset".into())));
                }
                let stream = futures::stream::iter(items);
                Ok::<FrameStream, ProviderError>(if self.hang {
                    stream.chain(futures::stream::pending()).boxed()
                } else {
                    stream.boxed()
                })
            })
        }
    }

    fn gateway(provider: &Arc<ScriptedProvider>) -> ChatGateway {
        let config = GatewayConfig::default().with_retry(RetryConfig::without_delay());
        ChatGateway::with_provider(config, provider.clone())
    }

    fn rate_limited() -> ProviderError {
        ProviderError::from_status(429, "slow down")
    }

    #[test]
    fn reasoning_models_omit_temperature() {
        let provider = Arc::new(ScriptedProvider::default());
        let gw = gateway(&provider);

        let call = gw.prepare(&ChatRequest::prompt("o3-mini", "", "hi").with_temperature(0.2)).unwrap();
        assert_eq!(call.params.model, "openai/o3-mini");
        assert!(call.params.temperature.is_none());

        let call = gw.prepare(&ChatRequest::prompt("openai/gpt-5-mini", "", "hi")).unwrap();
        assert!(call.params.temperature.is_none());
    }

    #[test]
    fn other_models_default_temperature() {
        let provider = Arc::new(ScriptedProvider::default());
        let gw = gateway(&provider);

        let call = gw.prepare(&ChatRequest::prompt("4o", "", "hi")).unwrap();
        assert_eq!(call.params.model, "openai/gpt-4o");
        assert_eq!(call.params.temperature, Some(0.7));

        let call = gw.prepare(&ChatRequest::prompt("4o", "", "hi").with_temperature(0.1)).unwrap();
        assert_eq!(call.params.temperature, Some(0.1));
    }

    #[test]
    fn empty_model_uses_default() {
        let provider = Arc::new(ScriptedProvider::default());
        let gw = gateway(&provider);
        let call = gw.prepare(&ChatRequest::prompt("  ", "", "hi")).unwrap();
        assert_eq!(call.params.model, crate::DEFAULT_MODEL);
    }

    #[test]
    fn input_tokens_cover_all_messages() {
        let provider = Arc::new(ScriptedProvider::default());
        let gw = gateway(&provider);
        let call = gw
            .prepare(&ChatRequest::prompt("4o", "Be helpful", "Hi, please help."))
            .unwrap();
        assert_eq!(call.input_tokens, 8);
        assert_eq!(call.params.messages[0].role, MessageRole::System);
    }

    #[test]
    fn output_schema_becomes_response_format() {
        let provider = Arc::new(ScriptedProvider::default());
        let gw = gateway(&provider);
        let request =
            ChatRequest::prompt("4o", "", "hi").with_output_schema(json!({"type": "object"}));
        let call = gw.prepare(&request).unwrap();
        let format = call.params.response_format.unwrap();
        assert_eq!(format.json_schema.unwrap().schema, json!({"type": "object"}));
    }

    #[tokio::test]
    async fn empty_conversation_is_rejected_before_dispatch() {
        let provider = Arc::new(ScriptedProvider::default());
        let gw = gateway(&provider);
        let err = gw
            .chat(&ChatRequest::with_messages("4o", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::EmptyConversation));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn chat_normalizes_completion() {
        let provider = Arc::new(ScriptedProvider {
            completion: Completion {
                id: Some("gen-42".into()),
                content: Some("Hello there".into()),
                usage: Some(UsageInfo {
                    prompt_tokens: Some(9),
                    completion_tokens: Some(2),
                    total_tokens: Some(11),
                }),
                finish_reason: Some("stop".into()),
            },
            ..Default::default()
        });
        let gw = gateway(&provider);

        let resp = gw
            .chat(&ChatRequest::prompt("4o", "Be helpful", "Hi, please help."))
            .await
            .unwrap();
        assert_eq!(resp.id.as_deref(), Some("gen-42"));
        assert_eq!(resp.model, "openai/gpt-4o");
        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.text(), "Hello there");
        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert_eq!(resp.usage.input_tokens, 8);
        assert_eq!(resp.usage.output_tokens, 2);
        assert_eq!(gw.usage().calls, 1);
    }

    #[tokio::test]
    async fn chat_estimates_output_without_reported_usage() {
        let provider = Arc::new(ScriptedProvider {
            completion: Completion {
                content: Some("abcdefgh".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        let gw = gateway(&provider);
        let resp = gw.chat(&ChatRequest::prompt("4o", "", "hi")).await.unwrap();
        assert_eq!(resp.usage.output_tokens, 3);
        assert!(resp.id.is_none());
    }

    #[tokio::test]
    async fn text_stream_delivers_growing_text() {
        let provider = Arc::new(ScriptedProvider::streaming(&["Hel", "", "lo", ", ", "world"]));
        let gw = gateway(&provider);
        let seen = Mutex::new(Vec::new());
        let sink = FnSink::new(|update: &StreamUpdate<'_>| {
            if let StreamUpdate::Text { accumulated, .. } = update {
                seen.lock().unwrap().push(accumulated.to_string());
            }
        });

        let resp = gw
            .chat_stream(&ChatRequest::prompt("4o", "", "hi"), StreamMode::Text, &sink)
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec!["Hel", "Hello", "Hello, ", "Hello, world"]);
        assert!(seen.windows(2).all(|w| w[1].len() > w[0].len()));
        assert_eq!(resp.text(), "Hello, world");
        assert_eq!(resp.usage.output_tokens, 4);
        assert_eq!(provider.last_request().temperature, Some(0.7));
    }

    #[tokio::test]
    async fn json_stream_emits_objects_in_order() {
        let provider = Arc::new(ScriptedProvider::streaming(&[
            "{\"a\"", ":1}", "garb", "age{\"b\"", ":2}",
        ]));
        let gw = gateway(&provider);
        let (sink, mut rx) = ChannelSink::new();

        let resp = gw
            .chat_stream(&ChatRequest::prompt("4o", "", "json please"), StreamMode::Json, &sink)
            .await
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), StreamItem::Json(json!({"a": 1})));
        assert_eq!(rx.try_recv().unwrap(), StreamItem::Json(json!({"b": 2})));
        assert!(rx.try_recv().is_err());
        assert_eq!(resp.text(), "{\"a\":1}garbage{\"b\":2}");
    }

    #[tokio::test]
    async fn stream_captures_first_response_id() {
        let provider = Arc::new(ScriptedProvider {
            frames: vec![
                Frame::default().with_id("gen-1"),
                Frame::text("hi").with_id("gen-2"),
            ],
            ..Default::default()
        });
        let gw = gateway(&provider);
        let resp = gw
            .chat_stream(&ChatRequest::prompt("4o", "", "hi"), StreamMode::Text, &NoopSink)
            .await
            .unwrap();
        assert_eq!(resp.id.as_deref(), Some("gen-1"));
    }

    #[tokio::test]
    async fn unsupported_mode_fails_before_dispatch() {
        let provider = Arc::new(ScriptedProvider::streaming(&["hi"]));
        let gw = gateway(&provider);
        let err = gw
            .chat_stream_named(&ChatRequest::prompt("4o", "", "hi"), "xml", &NoopSink)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedStreamMode(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_schema_fails_before_dispatch() {
        let provider = Arc::new(ScriptedProvider::streaming(&["{}"]));
        let gw = gateway(&provider);
        let request = ChatRequest::prompt("4o", "", "hi")
            .with_output_schema(json!({"type": "not-a-type"}));
        let err = gw
            .chat_stream(&request, StreamMode::Json, &NoopSink)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSchema(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn rate_limited_open_is_retried() {
        let provider = Arc::new(
            ScriptedProvider::streaming(&["ok"]).failing_first(vec![rate_limited(), rate_limited()]),
        );
        let gw = gateway(&provider);
        let resp = gw
            .chat_stream(&ChatRequest::prompt("4o", "", "hi"), StreamMode::Text, &NoopSink)
            .await
            .unwrap();
        assert_eq!(resp.text(), "ok");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_exhausted() {
        let provider = Arc::new(
            ScriptedProvider::default().failing_first((0..6).map(|_| rate_limited()).collect()),
        );
        let gw = gateway(&provider);
        let err = gw
            .chat(&ChatRequest::prompt("4o", "", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_exhausted(), "{err}");
        assert_eq!(provider.calls(), 6);
        assert_eq!(gw.usage().calls, 0);
    }

    #[tokio::test]
    async fn mid_stream_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider {
            break_after: Some(1),
            ..ScriptedProvider::streaming(&["partial", "never"])
        });
        let gw = gateway(&provider);
        let (sink, mut rx) = ChannelSink::new();
        let err = gw
            .chat_stream(&ChatRequest::prompt("4o", "", "hi"), StreamMode::Text, &sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Provider(ProviderError::Transport(_))
        ));
        assert_eq!(provider.calls(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancellation_stops_a_hanging_stream() {
        let provider = Arc::new(ScriptedProvider {
            hang: true,
            ..ScriptedProvider::streaming(&["first"])
        });
        let gw = gateway(&provider);
        let (tx, rx) = watch::channel(false);
        let sink = FnSink::new(move |_: &StreamUpdate<'_>| {
            let _ = tx.send(true);
        });
        let err = gw
            .chat_stream_cancellable(&ChatRequest::prompt("4o", "", "hi"), StreamMode::Text, &sink, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_never_dispatches() {
        let provider = Arc::new(ScriptedProvider::streaming(&["x"]));
        let gw = gateway(&provider);
        let (_tx, rx) = watch::channel(true);
        let err = gw
            .chat_stream_cancellable(&ChatRequest::prompt("4o", "", "hi"), StreamMode::Text, &NoopSink, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn explicit_messages_are_forwarded_in_order() {
        let provider = Arc::new(ScriptedProvider::streaming(&["ok"]));
        let gw = gateway(&provider);
        let request = ChatRequest::with_messages(
            "sonnet",
            vec![
                Message::system("s"),
                Message::user("u1"),
                Message::assistant("a1"),
                Message::user("u2"),
            ],
        );
        gw.chat_stream(&request, StreamMode::Text, &NoopSink)
            .await
            .unwrap();
        let sent = provider.last_request();
        assert_eq!(sent.model, "anthropic/claude-sonnet-4");
        let contents: Vec<&str> = sent.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["s", "u1", "a1", "u2"]);
    }
}
