//! Legacy buffered reassembly of `data:` event streams.
//!
//! Only used when `upstream.stream_mode = "buffered"`. The caller receives
//! nothing until the upstream sends `[DONE]` or closes, which defeats
//! streaming; passthrough is the default.

use serde_json::Value;

use crate::chat::EMPTY_REPLY_PLACEHOLDER;

const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates `choices[0].delta.content` across event chunks.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes. Returns true once the `[DONE]` sentinel has been seen.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.done {
            return true;
        }
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&line);
            if self.done {
                self.pending.clear();
                break;
            }
        }
        self.done
    }

    /// Flush any unterminated last line and return the reply text.
    pub fn finish(mut self) -> String {
        if !self.done && !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.handle_line(&line);
        }
        if self.text.is_empty() {
            EMPTY_REPLY_PLACEHOLDER.to_string()
        } else {
            self.text
        }
    }

    fn handle_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == DONE_SENTINEL {
            self.done = true;
            return;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(event) => {
                if let Some(delta) = event
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                {
                    self.text.push_str(delta);
                }
            }
            Err(e) => tracing::debug!(error = %e, "Skipping malformed stream event"),
        }
    }
}
