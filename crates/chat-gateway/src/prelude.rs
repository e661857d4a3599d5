//! Convenience re-exports for common `chat-gateway` types.
//!
//! Meant to be glob-imported by callers:
//!
//! ```ignore
//! use chat_gateway::prelude::*;
//! ```
//!
//! This pulls in the gateway and its config, request/response types, stream
//! modes and sinks, and the error types. Provider internals (wire types, the
//! SSE decoder) are left out; import those from their modules when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    ChatRequest, ChatResponse, Message, MessageInput, MessageRole, Usage, json_schema_for,
};

// ── Gateway ─────────────────────────────────────────────────────────
pub use crate::catalog::ModelCatalog;
pub use crate::config::{GatewayConfig, ProviderKind};
pub use crate::gateway::ChatGateway;
pub use crate::providers::ChatProvider;
pub use crate::tokens::TokenEstimator;

// ── Streaming ───────────────────────────────────────────────────────
pub use crate::sink::{
    ChannelSink, CompositeSink, FnSink, LoggingSink, NoopSink, StreamItem, StreamSink,
    StreamUpdate,
};
pub use crate::stream::StreamMode;

// ── Errors and retry ────────────────────────────────────────────────
pub use crate::api::retry::{ErrorKind, RetryConfig};
pub use crate::error::{GatewayError, ProviderError};
