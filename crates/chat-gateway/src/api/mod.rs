//! Upstream interaction support: SSE decoding, retry, and call tracing.
//!
//! These modules sit between the [`ChatGateway`](crate::gateway::ChatGateway)
//! and the provider adapters:
//!
//! - [`retry`]: error-kind classification (429 vs. timeouts vs. everything
//!   else) and the bounded [`RetryPolicy`] with exponential backoff.
//! - [`streaming`]: incremental SSE decoder and the `reqwest` body reader
//!   that turns a streaming response into provider frames.
//! - [`tracing`]: correlation IDs (`trace_id` / `span_id`) and the
//!   cumulative [`UsageTracker`].

pub mod retry;
pub mod streaming;
pub mod tracing;

// Re-export commonly used items at the module level.
pub use retry::{ErrorKind, RetryConfig, RetryPolicy};
pub use streaming::{SseDecoder, SseLine};
pub use tracing::{UsageTotals, UsageTracker, generate_span_id, generate_trace_id};
