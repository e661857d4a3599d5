//! Incremental JSON object extraction from a growing text stream.
//!
//! Models asked for JSON often interleave objects with prose, and a stream
//! delivers each object a few characters at a time. [`JsonExtractor`] keeps
//! the whole stream in a buffer and, after every delta that could have
//! closed an object, re-scans it for brace-balanced regions. Each region
//! that parses (and satisfies the optional schema) is reported once.
//!
//! Deduplication is by exact text: two textually identical objects in one
//! stream are reported once.
//!
//! Known limitation: a `{` in prose that is never closed keeps the scan
//! inside an open region, so no later object in that stream is reported.

use crate::error::{GatewayError, Result};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Every maximal top-level `{...}` region of `text`, in order.
///
/// A single depth-counter pass: `{` increments, `}` decrements, and a region
/// ends where the counter returns to zero. A `}` at depth zero is ignored.
/// Inside an open region, string literals are tracked (with `\` escapes) and
/// braces within them do not count. Quotes in prose outside a region are
/// ignored. A region still open at the end of `text` is not returned; it may
/// close on a later delta.
///
/// ```
/// use chat_gateway::stream::extractor::balanced_regions;
///
/// let text = r#"} first {"a":1} then {"b":{"c":"}"}} and {"open":"#;
/// assert_eq!(balanced_regions(text), vec![r#"{"a":1}"#, r#"{"b":{"c":"}"}}"#]);
/// ```
pub fn balanced_regions(text: &str) -> Vec<&str> {
    let mut regions = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                // Braces are ASCII, so both ends sit on char boundaries.
                if depth == 0
                    && let Some(region) = text.get(start..=i)
                {
                    regions.push(region);
                }
            }
            _ => {}
        }
    }
    regions
}

/// Per-call extraction state. Never shared between calls.
pub struct JsonExtractor {
    buffer: String,
    /// Exact region text of every object already reported.
    emitted: HashSet<String>,
    /// Regions that failed to parse or validate; logged once each.
    rejected: HashSet<String>,
    validator: Option<jsonschema::Validator>,
}

impl std::fmt::Debug for JsonExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonExtractor")
            .field("buffer_len", &self.buffer.len())
            .field("emitted", &self.emitted.len())
            .field("rejected", &self.rejected.len())
            .field("validating", &self.validator.is_some())
            .finish()
    }
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonExtractor {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            emitted: HashSet::new(),
            rejected: HashSet::new(),
            validator: None,
        }
    }

    /// Only report objects that validate against `schema`.
    pub fn with_schema(schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| GatewayError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            validator: Some(validator),
            ..Self::new()
        })
    }

    /// Append `delta` and return the objects it completed, in buffer order.
    pub fn feed(&mut self, delta: &str) -> Vec<Value> {
        self.buffer.push_str(delta);
        self.scan(delta)
    }

    /// Scan again without new input.
    pub fn rescan(&mut self) -> Vec<Value> {
        self.scan("")
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }

    fn scan(&mut self, delta: &str) -> Vec<Value> {
        if !self.buffer.contains('}') {
            return Vec::new();
        }

        let mut found = Vec::new();
        for region in balanced_regions(&self.buffer) {
            if self.emitted.contains(region) || self.rejected.contains(region) {
                continue;
            }
            match serde_json::from_str::<Value>(region) {
                Ok(value) => match self.schema_errors(&value) {
                    None => {
                        debug!("Extracted JSON object ({} bytes)", region.len());
                        self.emitted.insert(region.to_string());
                        found.push(value);
                    }
                    Some(errors) => {
                        warn!(
                            "JSON object failed schema validation: {errors}\n  span: {region}\n  delta: {delta:?}\n  buffer: {}",
                            self.buffer
                        );
                        self.rejected.insert(region.to_string());
                    }
                },
                Err(e) => {
                    warn!(
                        "Skipping unparseable JSON span: {e}\n  span: {region}\n  delta: {delta:?}\n  buffer: {}",
                        self.buffer
                    );
                    self.rejected.insert(region.to_string());
                }
            }
        }
        found
    }

    fn schema_errors(&self, value: &Value) -> Option<String> {
        let validator = self.validator.as_ref()?;
        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        }
    }
}
