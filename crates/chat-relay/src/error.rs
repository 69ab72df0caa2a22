//! Error types for chat-relay

use axum::{
    body::Body,
    http::{Response, StatusCode, header},
    response::IntoResponse,
};
use thiserror::Error;

/// The only error body a client ever sees.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred while processing your request.";

/// Main error type for chat-relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or invalid fields in the inbound chat request
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// A retrieval collaborator answered with a non-success status
    #[error("{service} returned {status}")]
    CollaboratorUnavailable { service: &'static str, status: u16 },

    /// A retrieval collaborator could not be reached or sent an unreadable body
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The LLM provider failed to start or continue the completion stream
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Network-level error (connection, timeout, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "config",
            RelayError::MalformedRequest(_) => "malformed_request",
            RelayError::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            RelayError::Collaborator(_) => "collaborator",
            RelayError::Upstream(_) => "upstream",
            RelayError::Network(_) => "network",
            RelayError::Serialization(_) => "serialization",
            RelayError::Server(_) => "server",
            RelayError::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Serialization(e.to_string())
    }
}

/// Every failure maps to the same opaque 500 body; details stay in the logs.
impl IntoResponse for RelayError {
    fn into_response(self) -> Response<Body> {
        tracing::error!(
            category = self.category(),
            error_message = %self,
            "Chat request failed"
        );

        generic_error_response()
    }
}

/// Build the generic JSON error response
pub fn generic_error_response() -> Response<Body> {
    let body = serde_json::json!({ "error": GENERIC_ERROR_MESSAGE });

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

/// Result type alias for chat-relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
