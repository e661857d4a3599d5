//! Correlation IDs and cumulative usage for gateway calls.
//!
//! Every call gets a `trace_id` recorded on its `chat` span; each dispatch
//! attempt within the call gets a `span_id` derived from it. A
//! [`UsageTracker`] sums token usage across all calls made through one
//! gateway.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique trace ID for a gateway call.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Use a counter to handle sub-nanosecond calls.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("tr-{ts:x}-{count:04x}")
}

/// Span ID for one dispatch attempt within a call.
pub fn generate_span_id(trace_id: &str, attempt: u32) -> String {
    format!("{trace_id}:a{attempt}")
}

/// Point-in-time totals from a [`UsageTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageTotals {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        format!(
            "{} call(s), tokens: {} input + {} output = {} total",
            self.calls,
            self.input_tokens,
            self.output_tokens,
            self.total_tokens(),
        )
    }
}

/// Lock-free running totals, safe to update from concurrent calls.
#[derive(Debug, Default)]
pub struct UsageTracker {
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call.
    pub fn record(&self, input_tokens: u32, output_tokens: u32) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(u64::from(input_tokens), Ordering::Relaxed);
        self.output_tokens
            .fetch_add(u64::from(output_tokens), Ordering::Relaxed);
    }

    pub fn totals(&self) -> UsageTotals {
        UsageTotals {
            calls: self.calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_unique() {
        let id1 = generate_trace_id();
        let id2 = generate_trace_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("tr-"));
    }

    #[test]
    fn span_id_includes_attempt() {
        let trace = "tr-abc123-0000";
        let span = generate_span_id(trace, 3);
        assert!(span.ends_with("a3"));
        assert!(span.starts_with(trace));
    }

    #[test]
    fn tracker_accumulates() {
        let tracker = UsageTracker::new();
        tracker.record(10, 5);
        tracker.record(20, 7);
        let totals = tracker.totals();
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.input_tokens, 30);
        assert_eq!(totals.output_tokens, 12);
        assert_eq!(totals.total_tokens(), 42);
        assert!(totals.summary().contains("2 call(s)"));
    }

    #[test]
    fn tracker_is_shareable_across_threads() {
        let tracker = std::sync::Arc::new(UsageTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let t = tracker.clone();
                std::thread::spawn(move || t.record(1, 1))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.totals().calls, 4);
    }
}
