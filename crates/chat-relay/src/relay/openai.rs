//! OpenAI-compatible streaming completion provider

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::env;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, info};

use super::sse::{SseDecoder, SseEvent};
use super::{ChunkStream, CompletionProvider, CompletionRequest};
use crate::chat::StreamChunk;
use crate::config::ProviderConfig;
use crate::error::{RelayError, Result};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// One `chat.completion.chunk` event
#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Streaming provider for any OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    url: String,
    api_key: String,
}

impl OpenAiProvider {
    /// Create a provider, reading the API key from `config.api_key_env`
    pub fn new(client: Client, config: &ProviderConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            RelayError::Config(format!("API key env var '{}' not set", config.api_key_env))
        })?;
        Ok(Self::with_api_key(client, config, api_key))
    }

    pub fn with_api_key(client: Client, config: &ProviderConfig, api_key: impl Into<String>) -> Self {
        let url = format!("{}/chat/completions", config.api_url.trim_end_matches('/'));
        info!("OpenAI-compatible provider configured at {url}");

        Self {
            client,
            url,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Starting streaming completion"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Network(format!("Completion request timed out: {e}"))
                } else if e.is_connect() {
                    RelayError::Network(format!("Failed to connect to provider: {e}"))
                } else {
                    RelayError::Upstream(format!("Completion request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::Upstream(format!(
                "Provider returned {status}: {error_text}"
            )));
        }

        Ok(Box::pin(CompletionChunks::new(Box::pin(response.bytes_stream()))))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Decodes an upstream SSE byte stream into [`StreamChunk`]s.
///
/// Ends at `data: [DONE]` or when the body ends. The first error ends the
/// stream after it is yielded.
pub struct CompletionChunks {
    inner: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk>>,
    finished: bool,
}

impl CompletionChunks {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn enqueue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                return;
            }
            match event {
                SseEvent::Done => self.finished = true,
                SseEvent::Data(data) => {
                    let parsed = parse_chunk(&data);
                    if parsed.is_err() {
                        self.finished = true;
                    }
                    self.pending.push_back(parsed);
                }
            }
        }
    }
}

impl Stream for CompletionChunks {
    type Item = Result<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let events = this.decoder.push(&bytes);
                    this.enqueue(events);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(RelayError::Upstream(format!(
                        "Stream interrupted: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    let events = this.decoder.finish();
                    this.enqueue(events);
                    this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Extract the text delta of one upstream event
fn parse_chunk(data: &str) -> Result<StreamChunk> {
    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| RelayError::Upstream(format!("Invalid stream event: {e}")))?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RelayError::Upstream(format!("Provider stream error: {message}")));
    }

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();

    Ok(StreamChunk::new(text))
}
