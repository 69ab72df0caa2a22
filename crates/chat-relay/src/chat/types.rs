//! Chat request types
//!
//! Defines the inbound request shape, the message list that flows through
//! augmentation, and the quota and stream units exchanged between stages.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{RelayError, Result};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    /// Newer replacement for `system` on some providers
    Developer,
    User,
    Assistant,
    /// Result of a tool call
    Tool,
}

/// A single message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Text content; `null` or missing (tool-call turns) reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Any other message fields (`name`, `tool_call_id`, `tool_calls`, ...),
    /// forwarded to the provider untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Augmentation strategy selected per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContextMode {
    /// No augmentation
    #[default]
    Plain,
    /// Document reference lookup (single upload or whole project)
    References,
    /// Realtime web search
    Realtime,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Plain => "plain",
            ContextMode::References => "references",
            ContextMode::Realtime => "realtime",
        }
    }

    /// Whether this mode consumes the last message as its query
    pub fn consumes_query(&self) -> bool {
        !matches!(self, ContextMode::Plain)
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(ContextMode::Plain),
            "references" => Ok(ContextMode::References),
            "realtime" => Ok(ContextMode::Realtime),
            other => Err(format!("unknown context mode '{other}'")),
        }
    }
}

impl TryFrom<String> for ContextMode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContextMode> for String {
    fn from(mode: ContextMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Inbound chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub context: ContextMode,
    pub messages: Vec<ChatMessage>,
    #[serde(
        rename = "maxTokens",
        alias = "max_tokens",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(rename = "projectId", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(rename = "uploadId", default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(alias = "llmModel", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Which reference collection a REFERENCES request searches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceScope {
    /// A single uploaded document
    Upload(String),
    /// Every document in a project
    Project(String),
}

impl ChatRequest {
    /// Parse and validate a request body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let request: ChatRequest = serde_json::from_slice(body)
            .map_err(|e| RelayError::MalformedRequest(format!("Invalid request body: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    /// Check the invariants later stages rely on
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(RelayError::MalformedRequest("userId is empty".to_string()));
        }

        if self.context.consumes_query() && self.messages.is_empty() {
            return Err(RelayError::MalformedRequest(format!(
                "messages must not be empty for {} context",
                self.context
            )));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RelayError::MalformedRequest(format!(
                    "temperature {temperature} is outside 0..=2"
                )));
            }
        }

        if self.context == ContextMode::References {
            self.reference_scope()?;
        }

        Ok(())
    }

    /// Resolve the reference lookup target; an upload id takes precedence
    pub fn reference_scope(&self) -> Result<ReferenceScope> {
        let non_empty = |id: &Option<String>| id.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(upload_id) = non_empty(&self.upload_id) {
            return Ok(ReferenceScope::Upload(upload_id));
        }
        if let Some(project_id) = non_empty(&self.project_id) {
            return Ok(ReferenceScope::Project(project_id));
        }

        Err(RelayError::MalformedRequest(
            "references context requires uploadId or projectId".to_string(),
        ))
    }
}

/// Why a quota check produced its outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuotaReason {
    Ok,
    Exceeded,
    Error,
}

/// Result of the usage accounting check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaOutcome {
    pub allowed: bool,
    pub reason: QuotaReason,
}

impl QuotaOutcome {
    pub fn ok() -> Self {
        Self {
            allowed: true,
            reason: QuotaReason::Ok,
        }
    }

    pub fn exceeded() -> Self {
        Self {
            allowed: false,
            reason: QuotaReason::Exceeded,
        }
    }

    pub fn error() -> Self {
        Self {
            allowed: false,
            reason: QuotaReason::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.reason == QuotaReason::Ok
    }
}

/// One incremental fragment of generated text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamChunk {
    pub text_delta: String,
}

impl StreamChunk {
    pub fn new(text_delta: impl Into<String>) -> Self {
        Self {
            text_delta: text_delta.into(),
        }
    }

    /// Blank deltas are never forwarded to the client
    pub fn has_content(&self) -> bool {
        !self.text_delta.trim().is_empty()
    }
}
