//! Incremental SSE decoding for upstream completion streams
//!
//! Upstream SSE format:
//! ```text
//! data: {"choices":[{"index":0,"delta":{"content":"Hello"}}]}
//!
//! data: [DONE]
//! ```

/// Represents a parsed SSE event
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Data event containing the payload
    Data(String),
    /// Terminal [DONE] marker
    Done,
}

/// Splits a byte stream into SSE events as bytes arrive.
///
/// Events end at a blank line. Splitting happens on raw bytes so a UTF-8
/// sequence cut across two network reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(bytes.iter().filter(|b| **b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_event_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let block = std::mem::take(&mut self.buffer);
        parse_event_block(&String::from_utf8_lossy(&block))
            .into_iter()
            .collect()
    }
}

/// Parse one event block; comment and non-data fields are ignored
fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    let data = data_lines.join("\n");
    if data == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data))
    }
}
