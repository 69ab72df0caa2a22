//! Integration tests for the chat endpoint
//!
//! Drives the router with in-process collaborators (and wiremock for the
//! retrieval services) to check augmentation, model selection, framing and
//! error mapping end to end.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

use chat_relay::augment::ContextAugmenter;
use chat_relay::chat::{ChatMessage, QuotaOutcome, Role};
use chat_relay::config::Config;
use chat_relay::envelope::{DecodedFrame, decode_stream};
use chat_relay::server::{AppState, create_router};
use chat_relay::testing::{FixedQuotaGate, ScriptStep, ScriptedProvider};

// =============================================================================
// Test Fixtures
// =============================================================================

const GENERIC_ERROR: &str = "An error occurred while processing your request.";

struct Harness {
    router: Router,
    provider: Arc<ScriptedProvider>,
    quota: Arc<FixedQuotaGate>,
}

/// Router wired to a scripted provider and a fixed quota answer.
/// Retrieval calls go to `app_url` (a wiremock server or an unused address).
fn harness(quota: QuotaOutcome, provider: ScriptedProvider, app_url: &str) -> Harness {
    let mut config = Config::default();
    config.collaborators.app_url = app_url.to_string();
    config.provider.default_model = "default-model".to_string();
    config.provider.fallback_model = "fallback-model".to_string();

    let augmenter = ContextAugmenter::new(reqwest::Client::new(), &config.collaborators).unwrap();
    let provider = Arc::new(provider);
    let quota = Arc::new(FixedQuotaGate::new(quota));

    let state = Arc::new(AppState {
        config,
        quota: quota.clone(),
        augmenter,
        provider: provider.clone(),
    });

    Harness {
        router: create_router(state),
        provider,
        quota,
    }
}

fn offline_harness(quota: QuotaOutcome, provider: ScriptedProvider) -> Harness {
    harness(quota, provider, "http://127.0.0.1:1")
}

fn post_chat(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn assert_generic_error(response: axum::response::Response) {
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let body = body_string(response).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "error": GENERIC_ERROR }));
    assert!(decode_stream(&body).is_empty());
}

fn plain_request(messages: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "userId": "u1",
        "context": "PLAIN",
        "messages": messages,
        "maxTokens": 16,
        "temperature": 0.7
    })
}

// =============================================================================
// Streaming Tests
// =============================================================================

mod streaming_tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_scenario_frames_and_terminator() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["He", "llo"]));

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "hi"}]),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "data: SGU=\n\ndata: bGxv\n\ndata: W0RPTkVd\n\n"
        );
    }

    #[tokio::test]
    async fn test_sse_headers_exact() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["x"]));

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "hi"}]),
            )))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(headers.get(header::CONNECTION).unwrap(), "keep-alive");
        assert_eq!(
            headers.get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-transform"
        );
        assert_eq!(headers.get(header::CONTENT_ENCODING).unwrap(), "none");
    }

    #[tokio::test]
    async fn test_frame_count_matches_non_blank_chunks() {
        let deltas = ["The", " ", "", "quick", "\n\n", "fox", "\t", " jumps"];
        let expected: Vec<DecodedFrame> = deltas
            .iter()
            .filter(|d| !d.trim().is_empty())
            .map(|d| DecodedFrame::Text(d.to_string()))
            .chain(std::iter::once(DecodedFrame::Done))
            .collect();

        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(deltas));
        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "go"}]),
            )))
            .await
            .unwrap();

        let frames = decode_stream(&body_string(response).await);
        assert_eq!(frames, expected);
        assert_eq!(frames.iter().filter(|f| **f == DecodedFrame::Done).count(), 1);
        assert_eq!(frames.last(), Some(&DecodedFrame::Done));
    }

    #[tokio::test]
    async fn test_model_text_with_newlines_survives_framing() {
        let h = offline_harness(
            QuotaOutcome::ok(),
            ScriptedProvider::with_chunks(["line1\n\ndata: injected\nline2"]),
        );

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "go"}]),
            )))
            .await
            .unwrap();

        let body = body_string(response).await;
        assert_eq!(
            decode_stream(&body),
            vec![
                DecodedFrame::Text("line1\n\ndata: injected\nline2".to_string()),
                DecodedFrame::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_upstream_yields_only_terminator() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["", " "]));

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "go"}]),
            )))
            .await
            .unwrap();

        assert_eq!(body_string(response).await, "data: W0RPTkVd\n\n");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_still_terminates() {
        let provider = ScriptedProvider::with_script(vec![
            ScriptStep::Chunk("partial".to_string()),
            ScriptStep::Fail("connection reset".to_string()),
            ScriptStep::Chunk("lost".to_string()),
        ]);
        let h = offline_harness(QuotaOutcome::ok(), provider);

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "go"}]),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            decode_stream(&body_string(response).await),
            vec![DecodedFrame::Text("partial".to_string()), DecodedFrame::Done]
        );
    }
}

// =============================================================================
// Quota / Model Selection Tests
// =============================================================================

mod model_selection_tests {
    use super::*;

    async fn model_used(quota: QuotaOutcome, requested: Option<&str>) -> String {
        let h = offline_harness(quota, ScriptedProvider::with_chunks(["ok"]));
        let mut body = plain_request(serde_json::json!([{"role": "user", "content": "hi"}]));
        if let Some(model) = requested {
            body["model"] = serde_json::json!(model);
        }

        let response = h.router.oneshot(post_chat(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_string(response).await;

        assert_eq!(h.quota.checked_users(), vec!["u1"]);
        h.provider.last_request().unwrap().model
    }

    #[tokio::test]
    async fn test_quota_ok_preserves_requested_model() {
        assert_eq!(model_used(QuotaOutcome::ok(), Some("gpt-4")).await, "gpt-4");
    }

    #[tokio::test]
    async fn test_quota_ok_without_model_uses_default() {
        assert_eq!(model_used(QuotaOutcome::ok(), None).await, "default-model");
    }

    #[tokio::test]
    async fn test_quota_exceeded_forces_fallback() {
        assert_eq!(
            model_used(QuotaOutcome::exceeded(), Some("gpt-4")).await,
            "fallback-model"
        );
    }

    #[tokio::test]
    async fn test_quota_error_forces_fallback_without_failing() {
        assert_eq!(
            model_used(QuotaOutcome::error(), Some("gpt-4")).await,
            "fallback-model"
        );
    }

    #[tokio::test]
    async fn test_downgrade_leaves_rest_of_request_untouched() {
        let h = offline_harness(QuotaOutcome::exceeded(), ScriptedProvider::with_chunks(["ok"]));
        let mut body = plain_request(serde_json::json!([{"role": "user", "content": "hi"}]));
        body["llmModel"] = serde_json::json!("gpt-4");

        let response = h.router.oneshot(post_chat(body)).await.unwrap();
        body_string(response).await;

        let sent = h.provider.last_request().unwrap();
        assert_eq!(sent.model, "fallback-model");
        assert_eq!(sent.messages, vec![ChatMessage::user("hi")]);
        assert_eq!(sent.max_tokens, Some(16));
        assert_eq!(sent.temperature, Some(0.7));
        assert_eq!(sent.top_p, 1);
        assert!(sent.stream);
    }
}

// =============================================================================
// Augmentation Tests
// =============================================================================

mod augmentation_tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_messages_reach_model_unchanged() {
        let messages = serde_json::json!([
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "What is Rust?"},
            {"role": "assistant", "content": "A language."},
            {"role": "user", "content": "Tell me more."}
        ]);
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["ok"]));

        let response = h
            .router
            .oneshot(post_chat(plain_request(messages)))
            .await
            .unwrap();
        body_string(response).await;

        assert_eq!(
            h.provider.last_request().unwrap().messages,
            vec![
                ChatMessage::new(Role::System, "You are terse."),
                ChatMessage::user("What is Rust?"),
                ChatMessage::new(Role::Assistant, "A language."),
                ChatMessage::user("Tell me more."),
            ]
        );
    }

    #[tokio::test]
    async fn test_realtime_scenario() {
        let mock_server = MockServer::start().await;
        let results = serde_json::json!({
            "results": [{"title": "Sunny", "url": "https://weather.example/today"}]
        });

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/search-web"))
            .and(matchers::body_json(serde_json::json!({"query": "weather today"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(results.clone()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let h = harness(
            QuotaOutcome::ok(),
            ScriptedProvider::with_chunks(["Sunny"]),
            &mock_server.uri(),
        );

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "userId": "u1",
                "context": "REALTIME",
                "messages": [{"role": "user", "content": "weather today"}],
                "maxTokens": 64,
                "temperature": 0.2
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_string(response).await;

        let sent = h.provider.last_request().unwrap();
        assert_eq!(sent.messages.len(), 1);

        let message = &sent.messages[0];
        assert_eq!(message.role, Role::User);
        assert!(message.content.starts_with("Web search results:\n\n "));
        assert!(message.content.contains(&results.to_string()));
        assert!(message.content.contains("\nCurrent date:"));
        assert!(message.content.contains(" GMT"));
        assert!(message.content.contains("[[number](URL)]"));
        assert!(message.content.contains("write separate answers for each subject"));
        assert_eq!(message.content.matches("weather today").count(), 2);
        assert!(message.content.ends_with("\nQuery:weather today "));
    }

    #[tokio::test]
    async fn test_references_upload_scenario() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/retrieve-single-reference-embeddings"))
            .and(matchers::body_json(
                serde_json::json!({"prompt": "What does it say?", "uploadId": "up-9"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json("It says hello."))
            .expect(1)
            .mount(&mock_server)
            .await;

        let h = harness(
            QuotaOutcome::ok(),
            ScriptedProvider::with_chunks(["Hello"]),
            &mock_server.uri(),
        );

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "userId": "u1",
                "context": "references",
                "messages": [
                    {"role": "system", "content": "Cite the document."},
                    {"role": "user", "content": "What does it say?"}
                ],
                "uploadId": "up-9",
                "projectId": "p-1"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_string(response).await;

        assert_eq!(
            h.provider.last_request().unwrap().messages,
            vec![
                ChatMessage::new(Role::System, "Cite the document."),
                ChatMessage::user("What does it say?\n Document: It says hello."),
            ]
        );
    }

    #[tokio::test]
    async fn test_references_project_scenario() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/retrieve-reference-embeddings"))
            .and(matchers::body_json(
                serde_json::json!({"prompt": "Summarize", "projectId": "p-1"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json("Project notes."))
            .expect(1)
            .mount(&mock_server)
            .await;

        let h = harness(
            QuotaOutcome::ok(),
            ScriptedProvider::with_chunks(["Done"]),
            &mock_server.uri(),
        );

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "userId": "u1",
                "context": "references",
                "messages": [{"role": "user", "content": "Summarize"}],
                "projectId": "p-1"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_string(response).await;

        assert_eq!(
            h.provider.last_request().unwrap().messages,
            vec![ChatMessage::user("Summarize\n Document: Project notes.")]
        );
    }
}

// =============================================================================
// Error Handling Tests
// =============================================================================

mod error_handling_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_reference_lookup_returns_500_without_frames() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/retrieve-reference-embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let h = harness(
            QuotaOutcome::ok(),
            ScriptedProvider::with_chunks(["never"]),
            &mock_server.uri(),
        );

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "userId": "u1",
                "context": "references",
                "messages": [{"role": "user", "content": "q"}],
                "projectId": "p-1"
            })))
            .await
            .unwrap();

        assert_generic_error(response).await;
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_failing_realtime_search_returns_500() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/search-web"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let h = harness(
            QuotaOutcome::ok(),
            ScriptedProvider::with_chunks(["never"]),
            &mock_server.uri(),
        );

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "userId": "u1",
                "context": "realtime",
                "messages": [{"role": "user", "content": "news"}]
            })))
            .await
            .unwrap();

        assert_generic_error(response).await;
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_collaborator_returns_500() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["never"]));

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "userId": "u1",
                "context": "realtime",
                "messages": [{"role": "user", "content": "news"}]
            })))
            .await
            .unwrap();

        assert_generic_error(response).await;
    }

    #[tokio::test]
    async fn test_provider_start_failure_returns_500() {
        let h = offline_harness(
            QuotaOutcome::ok(),
            ScriptedProvider::failing_to_start("invalid api key"),
        );

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "hi"}]),
            )))
            .await
            .unwrap();

        assert_generic_error(response).await;
    }

    #[tokio::test]
    async fn test_provider_failure_before_first_text_returns_500() {
        let provider = ScriptedProvider::with_script(vec![
            ScriptStep::Chunk(" ".to_string()),
            ScriptStep::Fail("provider overloaded".to_string()),
        ]);
        let h = offline_harness(QuotaOutcome::ok(), provider);

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "hi"}]),
            )))
            .await
            .unwrap();

        assert_generic_error(response).await;
        assert_eq!(h.provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failing_on_first_step_returns_500() {
        let provider =
            ScriptedProvider::with_script(vec![ScriptStep::Fail("provider overloaded".to_string())]);
        let h = offline_harness(QuotaOutcome::ok(), provider);

        let response = h
            .router
            .oneshot(post_chat(plain_request(
                serde_json::json!([{"role": "user", "content": "hi"}]),
            )))
            .await
            .unwrap();

        assert_generic_error(response).await;
    }

    #[tokio::test]
    async fn test_empty_messages_for_realtime_is_malformed() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["never"]));

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "userId": "u1",
                "context": "REALTIME",
                "messages": []
            })))
            .await
            .unwrap();

        assert_generic_error(response).await;
        assert!(h.quota.checked_users().is_empty());
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_user_id_is_malformed() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["never"]));

        let response = h
            .router
            .oneshot(post_chat(serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .await
            .unwrap();

        assert_generic_error(response).await;
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::with_chunks(["never"]));

        let response = h
            .router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_generic_error(response).await;
    }

    #[tokio::test]
    async fn test_get_on_chat_is_not_allowed() {
        let h = offline_harness(QuotaOutcome::ok(), ScriptedProvider::default());

        let response = h
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/chat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
