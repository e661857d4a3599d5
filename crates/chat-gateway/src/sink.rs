//! Stream sinks: how a streaming call reports progress to its caller.
//!
//! The gateway calls [`StreamSink::on_update`] synchronously, once per
//! update, in network-arrival order. It never calls one sink concurrently
//! for the same request.
//!
//! | Sink | Use case |
//! |------|----------|
//! | [`NoopSink`] | Streaming without observing progress |
//! | [`FnSink`] | Quick closures |
//! | [`LoggingSink`] | `tracing` output for every update |
//! | [`ChannelSink`] | Hand owned updates to another task |
//! | [`CompositeSink`] | Fan out to several sinks in order |
//! | Custom `impl StreamSink` | Full control (websocket push, UI) |

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One progress update from a streaming call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamUpdate<'a> {
    /// Text mode: all text so far, plus the delta that was just appended.
    Text { accumulated: &'a str, delta: &'a str },
    /// JSON mode: a newly completed JSON object.
    Json(&'a serde_json::Value),
}

impl StreamUpdate<'_> {
    /// Owned copy, for sending across tasks.
    pub fn to_item(&self) -> StreamItem {
        match self {
            StreamUpdate::Text { accumulated, delta } => StreamItem::Text {
                accumulated: (*accumulated).to_string(),
                delta: (*delta).to_string(),
            },
            StreamUpdate::Json(value) => StreamItem::Json((*value).clone()),
        }
    }
}

/// Owned form of [`StreamUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamItem {
    Text { accumulated: String, delta: String },
    Json(serde_json::Value),
}

/// Receiver of streaming progress.
pub trait StreamSink: Send + Sync {
    fn on_update(&self, update: &StreamUpdate<'_>);
}

/// Ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl StreamSink for NoopSink {
    fn on_update(&self, _update: &StreamUpdate<'_>) {}
}

/// A sink backed by a closure.
///
/// ```
/// use chat_gateway::sink::{FnSink, StreamUpdate};
///
/// let sink = FnSink::new(|update: &StreamUpdate<'_>| {
///     if let StreamUpdate::Text { delta, .. } = update {
///         print!("{delta}");
///     }
/// });
/// # let _ = sink;
/// ```
pub struct FnSink<F>(F)
where
    F: Fn(&StreamUpdate<'_>) + Send + Sync;

impl<F> FnSink<F>
where
    F: Fn(&StreamUpdate<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> StreamSink for FnSink<F>
where
    F: Fn(&StreamUpdate<'_>) + Send + Sync,
{
    fn on_update(&self, update: &StreamUpdate<'_>) {
        (self.0)(update)
    }
}

/// Logs updates through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl StreamSink for LoggingSink {
    fn on_update(&self, update: &StreamUpdate<'_>) {
        match update {
            StreamUpdate::Text { accumulated, delta } => {
                trace!("Text delta ({} chars, {} total)", delta.len(), accumulated.len());
            }
            StreamUpdate::Json(value) => debug!("JSON object: {value}"),
        }
    }
}

/// Forwards owned [`StreamItem`]s over an unbounded tokio channel.
///
/// Updates sent after the receiver is dropped are discarded.
///
/// ```
/// use chat_gateway::sink::{ChannelSink, StreamItem, StreamSink, StreamUpdate};
///
/// let (sink, mut rx) = ChannelSink::new();
/// sink.on_update(&StreamUpdate::Json(&serde_json::json!({"a": 1})));
/// assert_eq!(rx.try_recv().unwrap(), StreamItem::Json(serde_json::json!({"a": 1})));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamItem>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StreamSink for ChannelSink {
    fn on_update(&self, update: &StreamUpdate<'_>) {
        if self.tx.send(update.to_item()).is_err() {
            trace!("Stream receiver dropped; discarding update");
        }
    }
}

/// Dispatches each update to several sinks, in registration order.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Box<dyn StreamSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl StreamSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Add a sink only when `condition` holds.
    pub fn with_if(self, condition: bool, sink: impl StreamSink + 'static) -> Self {
        if condition { self.with(sink) } else { self }
    }
}

impl StreamSink for CompositeSink {
    fn on_update(&self, update: &StreamUpdate<'_>) {
        for sink in &self.sinks {
            sink.on_update(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fn_sink_receives_updates() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sink = FnSink::new(move |update: &StreamUpdate<'_>| {
            if matches!(update, StreamUpdate::Text { .. }) {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        sink.on_update(&StreamUpdate::Text {
            accumulated: "ab",
            delta: "b",
        });
        sink.on_update(&StreamUpdate::Json(&json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_sink_owns_items() {
        let (sink, mut rx) = ChannelSink::new();
        sink.on_update(&StreamUpdate::Text {
            accumulated: "Hel",
            delta: "l",
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamItem::Text {
                accumulated: "Hel".into(),
                delta: "l".into()
            }
        );
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_update(&StreamUpdate::Json(&json!({"a": 1})));
    }

    #[test]
    fn composite_dispatches_in_order() {
        let (first, mut rx1) = ChannelSink::new();
        let (second, mut rx2) = ChannelSink::new();
        let sink = CompositeSink::new()
            .with(first)
            .with_if(false, NoopSink)
            .with(second)
            .with(LoggingSink);
        sink.on_update(&StreamUpdate::Json(&json!({"k": "v"})));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn stream_item_serializes_with_type_tag() {
        let item = StreamItem::Text {
            accumulated: "a".into(),
            delta: "a".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "text");
    }
}
