//! Error types for the gateway and its upstream providers.
//!
//! [`ProviderError`] describes what went wrong talking to an upstream; its
//! [`kind()`](ProviderError::kind) drives the retry decision in
//! [`api::retry`](crate::api::retry). [`GatewayError`] is what callers see.

use crate::api::retry::ErrorKind;
use thiserror::Error;

/// Failure reported by a [`ChatProvider`](crate::providers::ChatProvider).
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("rate limited (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("upstream HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to decode upstream payload: {0}")]
    Decode(String),

    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ProviderError {
    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            // 529: Anthropic "overloaded".
            429 | 529 => ProviderError::RateLimited { status, message },
            408 | 504 => ProviderError::Timeout(format!("HTTP {status}: {message}")),
            _ => ProviderError::Http { status, message },
        }
    }

    /// Retry classification of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::of(self)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Error returned from [`ChatGateway`](crate::gateway::ChatGateway) calls.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("unsupported stream mode '{0}' (expected 'text' or 'json')")]
    UnsupportedStreamMode(String),

    #[error("request resolves to an empty message list")]
    EmptyConversation,

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid output schema: {0}")]
    InvalidSchema(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A transient error kind kept failing until its attempt budget ran out.
    #[error("retries exhausted after {attempts} attempt(s) on {kind} errors: {last}")]
    RetriesExhausted {
        kind: ErrorKind,
        attempts: u32,
        #[source]
        last: ProviderError,
    },

    #[error("stream cancelled by caller")]
    Cancelled,
}

impl GatewayError {
    /// Whether this error means the retry budget was used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, GatewayError::RetriesExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimited { status: 429, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(529, "overloaded"),
            ProviderError::RateLimited { status: 529, .. }
        ));
        assert_eq!(
            ProviderError::from_status(529, "overloaded").kind(),
            ErrorKind::RateLimited
        );
        assert!(matches!(
            ProviderError::from_status(504, "gateway timeout"),
            ProviderError::Timeout(_)
        ));
        assert!(matches!(
            ProviderError::from_status(401, "unauthorized"),
            ProviderError::Http { status: 401, .. }
        ));
    }

    #[test]
    fn exhausted_message_names_kind_and_attempts() {
        let err = GatewayError::RetriesExhausted {
            kind: ErrorKind::RateLimited,
            attempts: 6,
            last: ProviderError::from_status(429, "slow down"),
        };
        let text = err.to_string();
        assert!(text.contains("6 attempt(s)"), "{text}");
        assert!(text.contains("rate_limited"), "{text}");
        assert!(err.is_exhausted());
    }
}
