use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::augment::prompts::format_current_date;
use crate::chat::ChatRequest;
use crate::envelope::{frame_channel, sse_headers};
use crate::error::Result;
use crate::quota::select_model;
use crate::relay::{CompletionRequest, await_first_chunk, relay_completion};

use super::AppState;

/// Health check endpoint - returns JSON status
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Stream a context-augmented completion for one chat request
///
/// Every failure before the first frame becomes the generic 500 response,
/// including an upstream that fails before producing any text. Once the
/// stream has started the relay task owns the frame sink and the
/// response always ends with the terminal frame unless the client leaves.
pub async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response<Body> {
    let span = info_span!("chat", request_id = %Uuid::new_v4());

    match start_stream(state, &body).instrument(span).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn start_stream(state: Arc<AppState>, body: &[u8]) -> Result<Response<Body>> {
    let request = ChatRequest::from_slice(body)?;
    info!(
        user_id = %request.user_id,
        context = %request.context,
        messages = request.messages.len(),
        "Chat request received"
    );

    let outcome = state.quota.check(&request.user_id).await;
    let model = select_model(&outcome, request.model.as_deref(), &state.config.provider);
    if !outcome.is_ok() {
        info!(reason = ?outcome.reason, %model, "Quota not OK, using fallback model");
    }

    let current_date = format_current_date(&chrono::Local::now());
    let messages = state.augmenter.augment(&request, &current_date).await?;

    let completion = CompletionRequest::new(model, messages, request.temperature, request.max_tokens);
    let chunks = state.provider.stream_completion(&completion).await?;
    let chunks = await_first_chunk(chunks).await?;
    info!(model = %completion.model, "Upstream stream started");

    let (mut sink, receiver) = frame_channel(state.config.server.stream_buffer);
    tokio::spawn(
        async move {
            let summary = relay_completion(chunks, &mut sink).await;
            info!(
                frames = summary.frames,
                dropped = summary.dropped,
                completed = summary.completed,
                upstream_failed = summary.upstream_failed,
                client_disconnected = summary.client_disconnected,
                "Stream finished"
            );
        }
        .in_current_span(),
    );

    let mut response = Response::new(receiver.into_body());
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().extend(sse_headers());
    Ok(response)
}
