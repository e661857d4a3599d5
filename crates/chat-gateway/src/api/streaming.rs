//! Server-Sent Events (SSE) decoding for streaming chat completions.
//!
//! [`SseDecoder`] turns raw body chunks into `data:` payloads. It buffers
//! bytes rather than text so a multi-byte character split across two network
//! chunks is decoded intact. [`sse_frames`] wraps a streaming
//! `reqwest::Response` into a [`FrameStream`], delegating the per-payload
//! JSON shape to the provider adapter.

use crate::error::ProviderError;
use crate::providers::{Frame, FrameStream};
use futures::StreamExt;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// One meaningful line of an SSE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Payload of a `data:` line.
    Data(String),
    /// The `data: [DONE]` sentinel.
    Done,
}

/// Incremental SSE line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a body chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while !self.done
            && let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n')
        {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.decode_line(&raw, &mut lines);
        }
        lines
    }

    /// Flush an unterminated final line at end of body.
    pub fn finish(&mut self) -> Vec<SseLine> {
        let mut lines = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            self.decode_line(&raw, &mut lines);
        }
        lines
    }

    fn decode_line(&mut self, raw: &[u8], lines: &mut Vec<SseLine>) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        // Blank separators, `:` keep-alive comments, and `event:`/`id:` fields
        // carry nothing the adapters need.
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            lines.push(SseLine::Done);
        } else if !data.is_empty() {
            lines.push(SseLine::Data(data.to_string()));
        }
    }
}

/// Adapter hook: parse one `data:` payload into at most one frame.
pub type FrameParser = fn(&str) -> Result<Option<Frame>, ProviderError>;

struct SseState {
    response: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<Frame>,
    finished: bool,
    parse: FrameParser,
}

/// Read a streaming response chunk by chunk, yielding frames as they arrive.
pub fn sse_frames(response: reqwest::Response, parse: FrameParser) -> FrameStream {
    let state = SseState {
        response,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        parse,
    };

    futures::stream::try_unfold(state, next_frame).boxed()
}

async fn next_frame(mut state: SseState) -> Result<Option<(Frame, SseState)>, ProviderError> {
    loop {
        if let Some(frame) = state.pending.pop_front() {
            return Ok(Some((frame, state)));
        }
        if state.finished {
            debug!("SSE stream finished");
            return Ok(None);
        }

        let lines = match state.response.chunk().await? {
            Some(chunk) => {
                trace!("SSE chunk: {} bytes", chunk.len());
                state.decoder.push(&chunk)
            }
            None => {
                state.finished = true;
                state.decoder.finish()
            }
        };

        for line in lines {
            match line {
                SseLine::Done => state.finished = true,
                SseLine::Data(data) => {
                    if let Some(frame) = (state.parse)(&data)? {
                        state.pending.push_back(frame);
                    }
                }
            }
        }
    }
}
