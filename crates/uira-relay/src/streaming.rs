//! Streaming re-framer (SSE).
//!
//! Upstream OpenAI-compatible providers stream `data: {json}` lines followed
//! by a terminal `data: [DONE]`. Chunks from the transport have no alignment
//! to lines, so bytes are buffered until a `\n` arrives; only complete lines
//! are decoded, parsed and rewritten.
//!
//! Framing rules for each complete line:
//! - lines without the `data:` prefix are dropped
//! - `data: [DONE]` is forwarded verbatim with `\n\n`
//! - parseable payloads are rewritten and forwarded as `data: <json>\n\n`
//! - unparseable payloads are forwarded verbatim with a single `\n`

use crate::config::RelayConfig;
use crate::filter::{filter_content, take_reasoning, FilterOptions, THINK_CLOSE, THINK_OPEN};
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::fmt::Display;
use tracing::{debug, warn};

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Per-request line buffer and rewrite state.
#[derive(Debug)]
pub struct Reframer {
    buffer: Vec<u8>,
    opts: FilterOptions,
    /// A `<think>` block has been opened in the visible content and not closed.
    think_open: bool,
}

impl Reframer {
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_options(FilterOptions::from(config))
    }

    pub fn with_options(opts: FilterOptions) -> Self {
        Self {
            buffer: Vec::new(),
            opts,
            think_open: false,
        }
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Append a chunk and return the frames for every line it completes.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = decode_line(&raw[..raw.len() - 1]);
            if let Some(frame) = self.emit(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Process the unterminated remainder at clean end of stream.
    ///
    /// A `<think>` block still open at this point is closed.
    pub fn finish(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = decode_line(&raw);
            frames.extend(self.emit(&line));
        }
        frames.extend(self.close_think());
        frames
    }

    /// Frame closing a `<think>` block left open by reasoning-only deltas.
    fn close_think(&mut self) -> Option<String> {
        if !self.think_open {
            return None;
        }
        self.think_open = false;
        let event = json!({"choices": [{"index": 0, "delta": {"content": THINK_CLOSE}}]});
        Some(format!("{DATA_PREFIX} {event}\n\n"))
    }

    /// Turn one complete line (without terminator) into an outbound frame.
    pub fn emit(&mut self, line: &str) -> Option<String> {
        let payload = line.strip_prefix(DATA_PREFIX)?.trim_start();

        if payload.trim_end() == DONE_SENTINEL {
            let close = self.close_think().unwrap_or_default();
            return Some(format!("{close}{line}\n\n"));
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(mut event) => {
                self.rewrite_event(&mut event);
                Some(format!("{DATA_PREFIX} {event}\n\n"))
            }
            Err(e) => {
                debug!(error = %e, line = %line, "forwarding unparseable SSE line verbatim");
                Some(format!("{line}\n"))
            }
        }
    }

    fn rewrite_event(&mut self, event: &mut Value) {
        let Some(choices) = event.get_mut("choices").and_then(|c| c.as_array_mut()) else {
            return;
        };
        for choice in choices {
            if let Some(delta) = choice.get_mut("delta").and_then(|d| d.as_object_mut()) {
                self.rewrite_delta(delta);
            }
        }
    }

    fn rewrite_delta(&mut self, delta: &mut Map<String, Value>) {
        let reasoning = take_reasoning(delta);
        let content = delta
            .get("content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string());

        // Per-delta filtering never sees a closed pair, so stripping drops
        // reasoning instead of folding it.
        let visible = if self.opts.show_reasoning && !self.opts.strip_content {
            self.fold_delta(reasoning, content)
        } else {
            content
        };

        if let Some(text) = visible {
            let text = if self.opts.strip_content {
                filter_content(&text)
            } else {
                text
            };
            delta.insert("content".to_string(), Value::String(text));
        }
    }

    fn fold_delta(&mut self, reasoning: Option<String>, content: Option<String>) -> Option<String> {
        let mut out = String::new();
        if let Some(r) = reasoning {
            if !self.think_open {
                out.push_str(THINK_OPEN);
                self.think_open = true;
            }
            out.push_str(&r);
        }
        if let Some(c) = content.as_deref().filter(|c| !c.is_empty()) {
            if self.think_open {
                out.push_str(THINK_CLOSE);
                self.think_open = false;
            }
            out.push_str(c);
        }

        if out.is_empty() {
            content
        } else {
            Some(out)
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Re-frame an upstream byte stream into complete outbound SSE frames.
///
/// On a transport error the stream ends without an error frame and the
/// pending buffer is discarded. On clean end the remainder is flushed.
pub fn reframe_stream<S, B, E>(upstream: S, mut reframer: Reframer) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    stream! {
        let mut upstream = Box::pin(upstream);
        let mut failed = false;

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in reframer.ingest(bytes.as_ref()) {
                        yield frame;
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        pending_bytes = reframer.pending().len(),
                        "upstream stream failed, closing downstream"
                    );
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            for frame in reframer.finish() {
                yield frame;
            }
        }
    }
}
