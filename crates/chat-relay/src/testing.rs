//! Test utilities for chat-relay - deterministic collaborators
//!
//! This module provides in-process stand-ins for the quota service and the
//! LLM provider so handler tests run without network access:
//! - `FixedQuotaGate` answers every check with the same outcome
//! - `ScriptedProvider` replays a fixed chunk script and records its calls

use async_trait::async_trait;
use futures::stream;
use std::sync::Mutex;

use crate::chat::{QuotaOutcome, StreamChunk};
use crate::error::{RelayError, Result};
use crate::quota::QuotaGate;
use crate::relay::{ChunkStream, CompletionProvider, CompletionRequest};

/// Quota gate with a fixed answer that remembers who asked
#[derive(Debug)]
pub struct FixedQuotaGate {
    outcome: QuotaOutcome,
    checked: Mutex<Vec<String>>,
}

impl FixedQuotaGate {
    pub fn new(outcome: QuotaOutcome) -> Self {
        Self {
            outcome,
            checked: Mutex::new(Vec::new()),
        }
    }

    /// User ids checked so far, in call order
    pub fn checked_users(&self) -> Vec<String> {
        self.checked.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuotaGate for FixedQuotaGate {
    async fn check(&self, user_id: &str) -> QuotaOutcome {
        if let Ok(mut checked) = self.checked.lock() {
            checked.push(user_id.to_string());
        }
        self.outcome
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// One step of a scripted upstream stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Yield a chunk with this text delta
    Chunk(String),
    /// Fail mid-stream with this message
    Fail(String),
}

/// Completion provider that replays a script instead of calling an API
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    steps: Vec<ScriptStep>,
    start_failure: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    /// Provider that streams `deltas` and then ends
    pub fn with_chunks<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(deltas.into_iter().map(|d| ScriptStep::Chunk(d.into())).collect())
    }

    pub fn with_script(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Provider that rejects every request before streaming
    pub fn failing_to_start(message: impl Into<String>) -> Self {
        Self {
            start_failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The most recent request, if any
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests().pop()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(message) = &self.start_failure {
            return Err(RelayError::Upstream(message.clone()));
        }

        let items: Vec<Result<StreamChunk>> = self
            .steps
            .iter()
            .map(|step| match step {
                ScriptStep::Chunk(text) => Ok(StreamChunk::new(text.clone())),
                ScriptStep::Fail(message) => Err(RelayError::Upstream(message.clone())),
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
