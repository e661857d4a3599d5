//! Progressive consumption of a streaming response.
//!
//! A streaming call runs in one of two [`StreamMode`]s. Either way every
//! non-empty delta lands in a [`StreamAccumulator`]; JSON mode additionally
//! feeds a [`JsonExtractor`] and reports completed objects instead of text.

pub mod accumulator;
pub mod extractor;

pub use accumulator::StreamAccumulator;
pub use extractor::JsonExtractor;

use crate::error::{GatewayError, Result};
use crate::providers::Frame;
use crate::sink::{StreamSink, StreamUpdate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How streamed output is reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Accumulated text after every delta.
    #[default]
    Text,
    /// Each JSON object in the output, once, as soon as it closes.
    Json,
}

impl FromStr for StreamMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(StreamMode::Text),
            "json" => Ok(StreamMode::Json),
            _ => Err(GatewayError::UnsupportedStreamMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamMode::Text => write!(f, "text"),
            StreamMode::Json => write!(f, "json"),
        }
    }
}

/// What a finished stream produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub response_id: Option<String>,
    pub text: String,
    pub output_tokens: u32,
}

/// Per-call streaming state. Created for one call and dropped with it.
#[derive(Debug)]
pub struct StreamState {
    mode: StreamMode,
    accumulator: StreamAccumulator,
    extractor: Option<JsonExtractor>,
}

impl StreamState {
    /// `schema` only applies in JSON mode.
    pub fn new(mode: StreamMode, schema: Option<&serde_json::Value>) -> Result<Self> {
        let extractor = match (mode, schema) {
            (StreamMode::Text, _) => None,
            (StreamMode::Json, Some(schema)) => Some(JsonExtractor::with_schema(schema)?),
            (StreamMode::Json, None) => Some(JsonExtractor::new()),
        };
        Ok(Self {
            mode,
            accumulator: StreamAccumulator::new(),
            extractor,
        })
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Consume one frame, notifying `sink` of whatever it completed.
    pub fn apply(&mut self, frame: &Frame, sink: &dyn StreamSink) {
        self.accumulator.observe_id(frame.id.as_deref());

        let Some(delta) = frame.delta.as_deref() else {
            return;
        };
        if !self.accumulator.push(delta) {
            return;
        }

        match self.extractor.as_mut() {
            None => sink.on_update(&StreamUpdate::Text {
                accumulated: self.accumulator.text(),
                delta,
            }),
            Some(extractor) => {
                for value in extractor.feed(delta) {
                    sink.on_update(&StreamUpdate::Json(&value));
                }
            }
        }
    }

    pub fn accumulated_text(&self) -> &str {
        self.accumulator.text()
    }

    pub fn finish(self) -> StreamOutcome {
        let (response_id, text, output_tokens) = self.accumulator.into_parts();
        StreamOutcome {
            response_id,
            text,
            output_tokens,
        }
    }
}
