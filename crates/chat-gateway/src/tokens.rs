//! Heuristic token estimation.
//!
//! Upstreams tokenize differently and the gateway has no tokenizer, so input
//! usage is approximated from character counts. Counts are deterministic for
//! a given ratio but will not match any provider's billing exactly.

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Approximate token counter.
///
/// ```
/// use chat_gateway::tokens::TokenEstimator;
///
/// let estimator = TokenEstimator::default();
/// assert_eq!(estimator.estimate(""), 0);
/// assert_eq!(estimator.estimate("Hi"), 1);
/// assert_eq!(estimator.estimate("Be helpfulHi, please help."), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator {
    /// Non-positive or non-finite ratios fall back to the default.
    pub fn new(chars_per_token: f64) -> Self {
        if chars_per_token.is_finite() && chars_per_token > 0.0 {
            Self { chars_per_token }
        } else {
            Self::default()
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// `ceil(chars / chars_per_token)`; 0 for empty text.
    pub fn estimate(&self, text: &str) -> u32 {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        let tokens = (chars as f64 / self.chars_per_token).ceil();
        tokens.min(u32::MAX as f64) as u32
    }
}
