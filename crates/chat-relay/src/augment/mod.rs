//! Context augmentation
//!
//! Rewrites the message list before it reaches the model. Depending on the
//! request's context mode the last message is popped as a query, sent to a
//! retrieval collaborator, and replaced by a message that carries both the
//! query and the retrieved context.

pub mod prompts;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::chat::{ChatMessage, ChatRequest, ContextMode, ReferenceScope};
use crate::config::CollaboratorConfig;
use crate::error::{RelayError, Result};

#[derive(Debug, Serialize)]
struct ReferenceLookup<'a> {
    prompt: &'a str,
    #[serde(rename = "uploadId", skip_serializing_if = "Option::is_none")]
    upload_id: Option<&'a str>,
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RealtimeSearch<'a> {
    query: &'a str,
}

/// Calls the retrieval collaborators and rewrites message lists
#[derive(Debug, Clone)]
pub struct ContextAugmenter {
    client: Client,
    single_reference_url: Url,
    project_reference_url: Url,
    realtime_search_url: Url,
}

impl ContextAugmenter {
    /// Create an augmenter for the configured collaborator endpoints
    pub fn new(client: Client, config: &CollaboratorConfig) -> Result<Self> {
        Ok(Self {
            client,
            single_reference_url: config.single_reference_url()?,
            project_reference_url: config.project_reference_url()?,
            realtime_search_url: config.realtime_search_url()?,
        })
    }

    /// Produce the message list to send to the model.
    ///
    /// `current_date` is only used by realtime search and should come from
    /// [`prompts::format_current_date`].
    pub async fn augment(&self, request: &ChatRequest, current_date: &str) -> Result<Vec<ChatMessage>> {
        let mut messages = request.messages.clone();

        let content = match request.context {
            ContextMode::Plain => return Ok(messages),
            ContextMode::References => {
                let scope = request.reference_scope()?;
                let query = pop_query(&mut messages, request.context)?;
                let document = self.lookup_references(&query, &scope).await?;
                prompts::reference_message(&query, &document)
            }
            ContextMode::Realtime => {
                let query = pop_query(&mut messages, request.context)?;
                let results = self.search_realtime(&query).await?;
                prompts::realtime_message(&query, &results, current_date)
            }
        };

        messages.push(ChatMessage::user(content));
        Ok(messages)
    }

    /// Fetch reference documents for a query; returns the augmentation text
    pub async fn lookup_references(&self, query: &str, scope: &ReferenceScope) -> Result<String> {
        let (url, body, service) = match scope {
            ReferenceScope::Upload(id) => (
                &self.single_reference_url,
                ReferenceLookup {
                    prompt: query,
                    upload_id: Some(id.as_str()),
                    project_id: None,
                },
                "single reference lookup",
            ),
            ReferenceScope::Project(id) => (
                &self.project_reference_url,
                ReferenceLookup {
                    prompt: query,
                    upload_id: None,
                    project_id: Some(id.as_str()),
                },
                "project reference lookup",
            ),
        };

        debug!(?scope, "Looking up references");
        let document = self.post_json(url, &body, service).await?;

        // A JSON string is the document itself; anything else is embedded as JSON
        let text = match document {
            Value::String(text) => text,
            other => other.to_string(),
        };
        info!(service, document_len = text.len(), "Retrieved reference document");
        Ok(text)
    }

    /// Run a realtime web search; returns the serialized results
    pub async fn search_realtime(&self, query: &str) -> Result<String> {
        let service = "realtime search";
        let results = self
            .post_json(&self.realtime_search_url, &RealtimeSearch { query }, service)
            .await?;

        let serialized = serde_json::to_string(&results)?;
        info!(service, results_len = serialized.len(), "Retrieved search results");
        Ok(serialized)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &Url,
        body: &B,
        service: &'static str,
    ) -> Result<Value> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Network(format!("{service} timed out: {e}"))
                } else {
                    RelayError::Collaborator(format!("{service} request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::CollaboratorUnavailable {
                service,
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RelayError::Collaborator(format!("{service} returned invalid JSON: {e}")))
    }
}

/// Remove the last message and return its content as the retrieval query
fn pop_query(messages: &mut Vec<ChatMessage>, context: ContextMode) -> Result<String> {
    messages.pop().map(|m| m.content).ok_or_else(|| {
        RelayError::MalformedRequest(format!(
            "messages must not be empty for {context} context"
        ))
    })
}
