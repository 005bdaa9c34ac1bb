// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! End-to-end session tests against a mock completion endpoint.

use std::time::Duration;

use futures::StreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snowbrain::chat::ChatSession;
use snowbrain::config::Settings;
use snowbrain::error::{ApiError, SnowbrainError};
use snowbrain::llm::message::Role;

const ENDPOINT_PATH: &str = "/api/v1/chat/completions";

fn test_settings(server_uri: &str) -> Settings {
    let mut settings = Settings::default();
    settings.api_key_env = "SNOWBRAIN_E2E_TEST_UNSET".to_string();
    settings.api_key = Some("test-key".to_string());
    settings.base_url = format!("{server_uri}{ENDPOINT_PATH}");
    settings.system_prompt = "test directive".to_string();
    settings.request_timeout_secs = 5;
    settings
}

fn sse_body(fragments: &[&str], with_done: bool) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": fragment}}]})
        ));
    }
    if with_done {
        body.push_str("data: [DONE]\n");
    }
    body
}

async fn mock_stream_response(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

/// Wait for the turn task to finish clearing the busy flag after the
/// fragment stream has been fully drained.
async fn wait_idle(session: &ChatSession) {
    for _ in 0..100 {
        if !session.is_busy() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session did not return to idle");
}

// Scenario A: fragments concatenated in emission order equal the committed
// assistant message exactly.
#[tokio::test]
async fn streamed_fragments_commit_as_one_assistant_message() {
    let server = MockServer::start().await;
    mock_stream_response(&server, sse_body(&["Hel", "lo"], true)).await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();

    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    assert_eq!(fragments, vec!["Hel", "lo"]);

    wait_idle(&session).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[1].role, Role::User);
    assert_eq!(history[1].content, "Hi");
    assert_eq!(history[2].role, Role::Assistant);
    assert_eq!(history[2].content, "Hello");
}

#[tokio::test]
async fn request_carries_credential_and_full_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .and(header("Authorization", "Bearer test-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&["ok"], true), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();
    while stream.next().await.is_some() {}
    wait_idle(&session).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_tokens"], 1024);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "test directive");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "Hi");
}

// Scenario B: non-success HTTP status surfaces as a server error and the
// history keeps the user message but gains no assistant message.
#[tokio::test]
async fn http_error_surfaces_and_commits_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_raw(r#"{"error": {"message": "bad key"}}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();

    let first = stream.next().await.expect("expected an error item");
    match first.unwrap_err() {
        SnowbrainError::Api(ApiError::ServerError { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad key");
        }
        other => panic!("expected ServerError, got {other:?}"),
    }
    assert!(stream.next().await.is_none());

    wait_idle(&session).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::User);
}

// Scenario C: delta-less frames yield zero fragments but the turn still
// commits cleanly with empty assistant content.
#[tokio::test]
async fn metadata_only_frames_commit_empty_assistant_message() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\ndata: [DONE]\n",
        serde_json::json!({"choices": [{"delta": {}}]})
    );
    mock_stream_response(&server, body).await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();

    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    assert!(fragments.is_empty());

    wait_idle(&session).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].role, Role::Assistant);
    assert_eq!(history[2].content, "");
}

// A stream that ends without the sentinel is treated as a clean turn.
#[tokio::test]
async fn missing_sentinel_still_commits() {
    let server = MockServer::start().await;
    mock_stream_response(&server, sse_body(&["partial"], false)).await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();
    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    assert_eq!(fragments, vec!["partial"]);

    wait_idle(&session).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].content, "partial");
}

// Malformed frames inside the stream are skipped, not fatal.
#[tokio::test]
async fn malformed_frames_are_tolerated() {
    let server = MockServer::start().await;
    let body = format!(
        "{}data: {{broken json\n: keep-alive\n{}data: [DONE]\n",
        sse_body(&["one"], false),
        sse_body(&["two"], false)
    );
    mock_stream_response(&server, body).await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();
    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    assert_eq!(fragments, vec!["one", "two"]);

    wait_idle(&session).await;
    assert_eq!(session.snapshot()[2].content, "onetwo");
}

// Scenario D: retention. 25 sequential turns on a session with the default
// limit of 20 non-system messages; after each turn's trim the bound holds,
// and user messages are evicted oldest-first.
#[tokio::test]
async fn history_retention_stabilizes_at_limit() {
    let server = MockServer::start().await;
    mock_stream_response(&server, sse_body(&["r"], true)).await;

    let mut settings = test_settings(&server.uri());
    settings.max_messages = 20;
    let mut session = ChatSession::new(&settings).unwrap();

    for i in 1..=25 {
        let mut stream = session.run_turn(&format!("turn {i}")).unwrap();
        while stream.next().await.is_some() {}
        wait_idle(&session).await;
    }

    let history = session.snapshot();
    // Trim runs before each request, so the bound holds at send time; one
    // assistant commit after the final trim may sit on top.
    assert!(history.len() <= 22);
    assert_eq!(history[0].role, Role::System);

    // Oldest user turns are gone, newest survive in order.
    let user_contents: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert!(!user_contents.contains(&"turn 1"));
    assert!(!user_contents.contains(&"turn 5"));
    assert!(user_contents.contains(&"turn 25"));
    let positions: Vec<usize> = user_contents
        .iter()
        .map(|c| c.trim_start_matches("turn ").parse().unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

// Scenario E: a second turn while the first is in flight is rejected
// without touching the first turn's stream or the history.
#[tokio::test]
async fn concurrent_turn_is_rejected_as_busy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Hel", "lo"], true), "text/event-stream")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("first").unwrap();

    let err = session.run_turn("second").unwrap_err();
    assert!(matches!(err, SnowbrainError::SessionBusy));

    // First turn is unaffected by the rejected call.
    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    assert_eq!(fragments, vec!["Hel", "lo"]);

    wait_idle(&session).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].content, "first");
    assert_eq!(history[2].content, "Hello");
}

// Cancellation: stop() discards the partial turn without committing and
// frees the session for a new turn.
#[tokio::test]
async fn stop_cancels_in_flight_turn_without_commit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["never shown"], true), "text/event-stream")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let stream = session.run_turn("Hi").unwrap();
    assert!(session.is_busy());

    session.stop().await;
    drop(stream);
    assert!(!session.is_busy());

    // No assistant message was committed.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::User);

    // A fresh turn works immediately.
    let mut stream = session.run_turn("again").unwrap();
    let mut fragments = Vec::new();
    while let Some(item) = stream.next().await {
        fragments.push(item.unwrap());
    }
    assert_eq!(fragments, vec!["never shown"]);
}

// Dropping the fragment stream mid-turn counts as cancellation: nothing
// is committed once the producer notices the consumer is gone.
#[tokio::test]
async fn dropping_stream_discards_partial_turn() {
    let server = MockServer::start().await;
    mock_stream_response(&server, sse_body(&["a", "b", "c"], true)).await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();

    // Take one fragment, then walk away.
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, "a");
    drop(stream);

    wait_idle(&session).await;
    let history = session.snapshot();
    assert!(
        history.iter().all(|m| m.role != Role::Assistant),
        "partial turn must not be committed"
    );
}

// Non-streaming path: ask() commits both sides of the turn.
#[tokio::test]
async fn ask_commits_user_and_assistant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            serde_json::json!({
                "choices": [{"message": {"content": "Hello there"}}]
            })
            .to_string(),
            "application/json",
        ))
        .mount(&server)
        .await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let reply = session.ask("Hi").await.unwrap();
    assert_eq!(reply, "Hello there");

    let history = session.snapshot();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].content, "Hello there");
    assert!(!session.is_busy());
}

// The decoder yields identical fragment sequences for identical byte
// sequences across separate sessions.
#[tokio::test]
async fn decode_is_idempotent_across_sessions() {
    let server = MockServer::start().await;
    mock_stream_response(&server, sse_body(&["Hel", "lo", " 世界"], true)).await;

    let mut collected = Vec::new();
    for _ in 0..2 {
        let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
        let mut stream = session.run_turn("Hi").unwrap();
        let mut fragments = Vec::new();
        while let Some(item) = stream.next().await {
            fragments.push(item.unwrap());
        }
        wait_idle(&session).await;
        collected.push(fragments);
    }
    assert_eq!(collected[0], collected[1]);
}

// reset() restores the session to just the system directive.
#[tokio::test]
async fn reset_clears_history() {
    let server = MockServer::start().await;
    mock_stream_response(&server, sse_body(&["ok"], true)).await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let mut stream = session.run_turn("Hi").unwrap();
    while stream.next().await.is_some() {}
    wait_idle(&session).await;
    assert_eq!(session.history_len(), 2);

    session.reset().await;
    let history = session.snapshot();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[0].content, "test directive");
}

// A request timeout fails the turn rather than committing partial text.
#[tokio::test]
async fn timeout_surfaces_as_error_without_commit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["late"], true), "text/event-stream")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut settings = test_settings(&server.uri());
    settings.request_timeout_secs = 1;
    let mut session = ChatSession::new(&settings).unwrap();

    let mut stream = session.run_turn("Hi").unwrap();
    let first = stream.next().await.expect("expected an error item");
    assert!(matches!(
        first.unwrap_err(),
        SnowbrainError::Api(ApiError::Timeout)
    ));
    assert!(stream.next().await.is_none());

    wait_idle(&session).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::User);
}

// reset() during an in-flight turn waits the turn task out, so no late
// commit can land in the cleared history.
#[tokio::test]
async fn reset_during_turn_leaves_only_system_directive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["late reply"], true), "text/event-stream")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let mut session = ChatSession::new(&test_settings(&server.uri())).unwrap();
    let _stream = session.run_turn("Hi").unwrap();

    session.reset().await;
    assert_eq!(session.snapshot().len(), 1);

    // Long after the mocked response would have arrived, the history is
    // still just the system directive.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let history = session.snapshot();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::System);
}
