//! chat-relay - Context-augmented streaming chat completions
//!
//! This crate provides an HTTP service that takes a chat request, optionally
//! enriches it with document references or realtime search results, and
//! streams the model's reply back to the client as base64-framed SSE events.

pub mod augment;
pub mod chat;
pub mod config;
pub mod envelope;
pub mod error;
pub mod quota;
pub mod relay;
pub mod server;
pub mod testing;

pub use error::RelayError;
