//! Completion relay
//!
//! Starts a streaming completion with the LLM provider and forwards every
//! non-blank token to the client's frame sink in arrival order, followed by
//! exactly one `[DONE]` frame.

mod openai;
pub mod sse;

pub use openai::{CompletionChunks, OpenAiProvider};

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use tracing::{debug, error};

use crate::chat::{ChatMessage, StreamChunk};
use crate::envelope::{FrameSink, WireFrame};
use crate::error::Result;

/// Lazy, finite, non-restartable sequence of upstream chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Body of a streaming chat completion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling is pinned to 1
    pub top_p: u8,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(
        model: String,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            model,
            messages,
            temperature,
            max_tokens,
            top_p: 1,
            stream: true,
        }
    }
}

/// Trait for streaming completion backends
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a streaming completion.
    ///
    /// An error here means nothing has been sent to the client yet.
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<ChunkStream>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// What happened while relaying one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Text frames written (excludes the terminal frame)
    pub frames: usize,
    /// Blank chunks filtered out
    pub dropped: usize,
    /// Whether the terminal frame was written
    pub completed: bool,
    /// The upstream stream failed after it started
    pub upstream_failed: bool,
    /// The client went away before the stream ended
    pub client_disconnected: bool,
}

/// Wait for the first chunk with text before committing to a response.
///
/// Blank chunks read on the way are discarded. An upstream error that arrives
/// before any text is returned as-is. Otherwise the returned stream replays
/// the chunk that was read and then continues with the rest of the upstream.
pub async fn await_first_chunk(mut chunks: ChunkStream) -> Result<ChunkStream> {
    while let Some(item) = chunks.next().await {
        let chunk = item?;
        if chunk.has_content() {
            return Ok(Box::pin(stream::iter([Ok(chunk)]).chain(chunks)));
        }
    }

    debug!("Upstream ended without any text");
    Ok(Box::pin(stream::empty::<Result<StreamChunk>>()))
}

/// Forward `chunks` into `sink` and close it.
///
/// Blank chunks are dropped. A mid-stream upstream error is logged and still
/// followed by the terminal frame. If the client disconnects, the upstream
/// stream is dropped without being drained.
pub async fn relay_completion<S>(mut chunks: S, sink: &mut FrameSink) -> RelaySummary
where
    S: Stream<Item = Result<StreamChunk>> + Unpin,
{
    let mut summary = RelaySummary::default();

    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) if chunk.has_content() => {
                if sink.write(&WireFrame::encode(&chunk.text_delta)).await.is_err() {
                    debug!(frames = summary.frames, "Client disconnected, abandoning upstream stream");
                    summary.client_disconnected = true;
                    sink.close();
                    return summary;
                }
                summary.frames += 1;
            }
            Ok(_) => summary.dropped += 1,
            Err(e) => {
                error!(
                    category = e.category(),
                    error_message = %e,
                    frames = summary.frames,
                    "Upstream stream failed mid-response"
                );
                summary.upstream_failed = true;
                break;
            }
        }
    }

    match sink.write(&WireFrame::done()).await {
        Ok(()) => summary.completed = true,
        Err(_) => summary.client_disconnected = true,
    }
    sink.close();

    summary
}
