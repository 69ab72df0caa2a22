//! SSE transport envelope
//!
//! Every piece of model text is base64-encoded before framing so embedded
//! newlines and control characters cannot break the one-record-per-event
//! SSE convention:
//!
//! ```text
//! data: SGU=
//!
//! data: bGxv
//!
//! data: W0RPTkVd
//! ```
//!
//! The last record always decodes to `[DONE]`.

mod sink;

pub use sink::{FrameReceiver, FrameSink, SinkClosed, frame_channel};

use axum::http::{HeaderMap, HeaderValue, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

/// Payload of the terminal frame, before encoding
pub const DONE_SENTINEL: &str = "[DONE]";

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// A client-visible SSE record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    encoded_payload: String,
}

impl WireFrame {
    /// Frame a piece of model text
    pub fn encode(text: &str) -> Self {
        Self {
            encoded_payload: STANDARD.encode(text.as_bytes()),
        }
    }

    /// The end-of-stream frame
    pub fn done() -> Self {
        Self::encode(DONE_SENTINEL)
    }

    pub fn encoded_payload(&self) -> &str {
        &self.encoded_payload
    }

    /// Serialize as a `data: <encoded>\n\n` record
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.encoded_payload))
    }
}

/// Response headers for a successful stream
pub fn sse_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("none"));
    headers
}

/// A decoded record from a relayed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// Model text
    Text(String),
    /// Terminal `[DONE]` marker
    Done,
}

/// Decode a raw relayed stream back into text, the way a client does.
///
/// Records that are not valid base64 or not UTF-8 are skipped.
pub fn decode_stream(raw: &str) -> Vec<DecodedFrame> {
    raw.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| STANDARD.decode(data.trim()).ok())
        .filter_map(|bytes| String::from_utf8(bytes).ok())
        .map(|text| {
            if text == DONE_SENTINEL {
                DecodedFrame::Done
            } else {
                DecodedFrame::Text(text)
            }
        })
        .collect()
}
