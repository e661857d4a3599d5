//! Text accumulation for one streaming call.

/// Appends text deltas and counts them.
///
/// The output-token count is one per non-empty delta. Upstreams usually send
/// about one token per delta, so this is an approximation.
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    text: String,
    output_tokens: u32,
    response_id: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the response id. Only the first non-empty id is kept.
    pub fn observe_id(&mut self, id: Option<&str>) {
        if self.response_id.is_none()
            && let Some(id) = id.filter(|id| !id.is_empty())
        {
            self.response_id = Some(id.to_string());
        }
    }

    /// Append a delta. Returns `false` (and changes nothing) for an empty one.
    pub fn push(&mut self, delta: &str) -> bool {
        if delta.is_empty() {
            return false;
        }
        self.text.push_str(delta);
        self.output_tokens = self.output_tokens.saturating_add(1);
        true
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn output_tokens(&self) -> u32 {
        self.output_tokens
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn into_parts(self) -> (Option<String>, String, u32) {
        (self.response_id, self.text, self.output_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_non_empty_deltas() {
        let mut acc = StreamAccumulator::new();
        for delta in ["Hel", "", "lo", " world"] {
            acc.push(delta);
        }
        assert_eq!(acc.text(), "Hello world");
        assert_eq!(acc.output_tokens(), 3);
    }

    #[test]
    fn empty_delta_is_rejected() {
        let mut acc = StreamAccumulator::new();
        assert!(!acc.push(""));
        assert_eq!(acc.output_tokens(), 0);
    }

    #[test]
    fn first_non_empty_id_wins() {
        let mut acc = StreamAccumulator::new();
        acc.observe_id(None);
        acc.observe_id(Some(""));
        acc.observe_id(Some("gen-1"));
        acc.observe_id(Some("gen-2"));
        assert_eq!(acc.response_id(), Some("gen-1"));

        let (id, text, tokens) = acc.into_parts();
        assert_eq!(id.as_deref(), Some("gen-1"));
        assert!(text.is_empty());
        assert_eq!(tokens, 0);
    }
}
