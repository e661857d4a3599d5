//! Gateway configuration.
//!
//! A [`GatewayConfig`] is an explicit value handed to
//! [`ChatGateway::new`](crate::gateway::ChatGateway::new); nothing in the
//! library reads process-wide state on its own. Binaries build one with
//! [`GatewayConfig::from_env`] or [`GatewayConfig::from_file`] at startup.
//!
//! # Examples
//!
//! ```
//! use chat_gateway::config::{GatewayConfig, ProviderKind};
//!
//! let config = GatewayConfig::new("sk-or-...")
//!     .with_base_url("http://localhost:8080/v1")
//!     .with_default_temperature(0.2)
//!     .with_alias("fast", "openai/gpt-4o-mini");
//!
//! assert_eq!(config.provider, ProviderKind::OpenAiCompatible);
//! assert_eq!(config.effective_base_url(), "http://localhost:8080/v1");
//! ```
//!
//! A JSON config file may set any subset of fields:
//!
//! ```json
//! { "provider": "anthropic", "api_key": "...", "retry": { "base_delay_ms": 500 } }
//! ```

use crate::api::retry::RetryConfig;
use crate::error::{GatewayError, Result};
use crate::tokens::DEFAULT_CHARS_PER_TOKEN;
use crate::{DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Which upstream dialect to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    #[serde(alias = "openai", alias = "openrouter")]
    OpenAiCompatible,
    Anthropic,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiCompatible => OPENROUTER_BASE_URL,
            ProviderKind::Anthropic => ANTHROPIC_BASE_URL,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openrouter" | "openai_compatible" | "openai-compatible" => {
                Ok(ProviderKind::OpenAiCompatible)
            }
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(GatewayError::Config(format!("unknown provider '{other}'"))),
        }
    }
}

/// Everything the gateway needs to reach an upstream and fill in defaults.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub provider: ProviderKind,
    /// Empty means the provider's default base URL.
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// `HTTP-Referer` header (OpenRouter attribution).
    pub referer: String,
    /// `X-Title` header (OpenRouter attribution).
    pub title: String,
    /// Transport timeout per request; surfaces as a Timeout error kind.
    pub timeout_secs: u64,
    /// Model used when a request leaves its model id empty.
    pub default_model: String,
    /// Temperature for non-reasoning models when the request sets none.
    pub default_temperature: f32,
    pub default_max_tokens: Option<u32>,
    /// Ratio used by the token estimator.
    pub chars_per_token: f64,
    /// Extra aliases layered over the built-in catalog.
    pub aliases: HashMap<String, String>,
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: String::new(),
            api_key: String::new(),
            referer: "https://github.com/tacryt-socryp/chat-gateway".into(),
            title: "chat-gateway".into(),
            timeout_secs: 120,
            default_model: DEFAULT_MODEL.into(),
            default_temperature: DEFAULT_TEMPERATURE,
            default_max_tokens: None,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            aliases: HashMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

// The API key must never end up in logs.
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.effective_base_url())
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("timeout_secs", &self.timeout_secs)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("chars_per_token", &self.chars_per_token)
            .field("aliases", &self.aliases.len())
            .field("retry", &self.retry)
            .finish()
    }
}

impl GatewayConfig {
    /// Defaults plus an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_headers(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = Some(max_tokens);
        self
    }

    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.chars_per_token = ratio;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, model: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), model.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured base URL, or the provider's default when unset.
    pub fn effective_base_url(&self) -> &str {
        if self.base_url.is_empty() {
            self.provider.default_base_url()
        } else {
            &self.base_url
        }
    }

    /// Read configuration from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `GATEWAY_PROVIDER` | `provider` (`openai`, `openrouter`, `anthropic`) |
    /// | `GATEWAY_BASE_URL` | `base_url` |
    /// | `GATEWAY_API_KEY`, then `OPENROUTER_KEY`, then `ANTHROPIC_API_KEY` | `api_key` |
    /// | `GATEWAY_MODEL` | `default_model` |
    /// | `GATEWAY_TIMEOUT_SECS` | `timeout_secs` |
    pub fn from_env() -> Result<Self> {
        Self::default().merge_lookup(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            GatewayError::Config(format!("failed to parse config '{}': {e}", path.display()))
        })
    }

    /// Overlay values found through `lookup` onto `self`.
    pub fn merge_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(kind) = lookup("GATEWAY_PROVIDER") {
            self.provider = kind.parse()?;
        }
        if let Some(url) = lookup("GATEWAY_BASE_URL") {
            self.base_url = url;
        }
        if let Some(key) = lookup("GATEWAY_API_KEY")
            .or_else(|| lookup("OPENROUTER_KEY"))
            .or_else(|| lookup("ANTHROPIC_API_KEY"))
        {
            self.api_key = key;
        }
        if let Some(model) = lookup("GATEWAY_MODEL") {
            self.default_model = model;
        }
        if let Some(secs) = lookup("GATEWAY_TIMEOUT_SECS") {
            self.timeout_secs = secs.trim().parse().map_err(|_| {
                GatewayError::Config(format!("GATEWAY_TIMEOUT_SECS is not a number: '{secs}'"))
            })?;
        }
        Ok(self)
    }
}
