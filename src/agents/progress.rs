//! Progress emission, decoupled from transport.
//!
//! The orchestrator emits every externally-visible step through a
//! `ProgressSink`. The streaming endpoint bridges frames onto the SSE
//! response through a channel; the JSON endpoint discards them.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One named frame for the event channel. Payloads stay scalar-only so they
/// can be re-serialised anywhere.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: String,
    pub data: Value,
}

impl Frame {
    pub fn new(event: &str, data: Value) -> Self {
        Frame {
            event: event.to_string(),
            data,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    /// Emit a frame. Failures flip the writable flag instead of erroring;
    /// the pipeline checks it at the next suspension point.
    fn emit(&self, event: &str, data: Value);

    /// False once the client went away. In-flight upstream work completes
    /// and its result is discarded.
    fn is_writable(&self) -> bool {
        true
    }
}

/// Discards everything; used by the non-streaming endpoint.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &str, _data: Value) {}
}

/// Bridges frames to the SSE response task over an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Frame>,
    writable: AtomicBool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Frame>) -> Self {
        ChannelSink {
            tx,
            writable: AtomicBool::new(true),
        }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &str, data: Value) {
        if !self.is_writable() {
            return;
        }
        if self.tx.send(Frame::new(event, data)).is_err() {
            // Receiver dropped: the client disconnected mid-stream.
            log::debug!("[SSE] client gone, dropping '{}' frame", event);
            self.writable.store(false, Ordering::SeqCst);
        }
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }
}

/// Convenience used by the executor for per-phase progress.
pub fn mcp_progress(sink: &dyn ProgressSink, step: &str, detail: Value) {
    let mut data = json!({"type": "progress", "step": step});
    if let (Some(obj), Some(extra)) = (data.as_object_mut(), detail.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    sink.emit("mcp-progress", data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        mcp_progress(&sink, "tool_call", json!({"tool": "search"}));

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, "mcp-progress");
        assert_eq!(frame.data["step"], json!("tool_call"));
        assert_eq!(frame.data["tool"], json!("search"));
    }

    #[test]
    fn test_channel_sink_detects_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        drop(rx);

        assert!(sink.is_writable());
        sink.emit("delta", json!({"text": "chunk"}));
        assert!(!sink.is_writable(), "send failure must flip the writable flag");
    }
}
