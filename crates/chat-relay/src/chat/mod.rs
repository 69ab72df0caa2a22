//! Chat request model
//!
//! Types shared by every stage of the request pipeline.

pub mod types;

pub use types::{
    ChatMessage, ChatRequest, ContextMode, QuotaOutcome, QuotaReason, ReferenceScope, Role,
    StreamChunk,
};
