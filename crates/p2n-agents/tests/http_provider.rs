// crates/p2n-agents/tests/http_provider.rs
// ============================================================================
// Module: HTTP Provider Tests
// Description: Tests for the SSE stream client against a local server.
// Purpose: Exercise frame parsing, collection, and fail-closed behavior.
// Dependencies: p2n-agents, tiny_http, tokio
// ============================================================================
//! ## Overview
//! Validates stream parsing and scheme policy for the HTTP provider.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use p2n_agents::AgentRequest;
use p2n_agents::HttpLlmConfig;
use p2n_agents::HttpLlmProvider;
use p2n_agents::LlmError;
use p2n_agents::LlmProvider;
use p2n_agents::ProviderEvent;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serves one request with the given SSE body on a background thread.
fn serve_once(body: &'static str) -> String {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr();
    std::thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let response = Response::from_string(body).with_header(
                Header::from_bytes("Content-Type", "text/event-stream").unwrap(),
            );
            request.respond(response).expect("respond");
        }
    });
    format!("http://{addr}")
}

/// Returns a request fixture with no tools.
fn request() -> AgentRequest {
    AgentRequest {
        model: "model-1".to_string(),
        instructions: "test".to_string(),
        input: "test".to_string(),
        temperature: 0.0,
        max_output_tokens: 64,
        tools: Vec::new(),
    }
}

/// Returns a provider config allowing cleartext for the local server.
fn local_config(base_url: String) -> HttpLlmConfig {
    let mut config = HttpLlmConfig::new(base_url, "test-key");
    config.allow_http = true;
    config
}

// ============================================================================
// SECTION: Stream Tests
// ============================================================================

/// Tests a full stream collects text and function arguments.
#[tokio::test]
async fn stream_collects_text_and_function_calls() {
    let body = "data: {\"type\":\"response.output_text.delta\",\"delta\":\"thinking \"}\n\
                data: {\"type\":\"response.output_text.delta\",\"delta\":\"done\"}\n\
                data: {\"type\":\"response.function_call.start\",\"name\":\"record\"}\n\
                data: {\"type\":\"response.function_call_arguments.delta\",\"name\":\"record\",\"delta\":\"{\\\"a\\\":\"}\n\
                data: {\"type\":\"response.function_call_arguments.delta\",\"name\":\"record\",\"delta\":\"1}\"}\n\
                data: {\"type\":\"response.completed\"}\n\
                data: [DONE]\n";
    let base_url = serve_once(body);
    let provider = HttpLlmProvider::new(local_config(base_url)).unwrap();

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let response = provider.stream(&request(), events_tx).await.unwrap();

    assert_eq!(response.text, "thinking done");
    assert_eq!(response.function_calls.len(), 1);
    assert_eq!(response.function_calls[0].name, "record");
    assert_eq!(response.function_calls[0].arguments, "{\"a\":1}");

    let mut saw_completion = false;
    while let Some(event) = events_rx.recv().await {
        if event == ProviderEvent::Completed {
            saw_completion = true;
        }
    }
    assert!(saw_completion);
}

/// Tests file-search frames surface as events.
#[tokio::test]
async fn stream_surfaces_file_search_calls() {
    let body = "data: {\"type\":\"response.file_search_call\",\"query\":\"accuracy table\"}\n\
                data: {\"type\":\"response.completed\"}\n";
    let base_url = serve_once(body);
    let provider = HttpLlmProvider::new(local_config(base_url)).unwrap();

    let (events_tx, mut events_rx) = mpsc::channel(64);
    provider.stream(&request(), events_tx).await.unwrap();

    let first = events_rx.recv().await.unwrap();
    assert_eq!(
        first,
        ProviderEvent::FileSearchCall {
            query: Some("accuracy table".to_string()),
        }
    );
}

/// Tests a stream without a completion frame fails closed.
#[tokio::test]
async fn stream_without_completion_fails() {
    let body = "data: {\"type\":\"response.output_text.delta\",\"delta\":\"partial\"}\n";
    let base_url = serve_once(body);
    let provider = HttpLlmProvider::new(local_config(base_url)).unwrap();

    let (events_tx, _events_rx) = mpsc::channel(64);
    let outcome = provider.stream(&request(), events_tx).await;
    assert!(matches!(outcome, Err(LlmError::Protocol(_))));
}

/// Tests unknown frame kinds are protocol violations.
#[tokio::test]
async fn unknown_frame_kind_fails() {
    let body = "data: {\"type\":\"response.surprise\"}\n";
    let base_url = serve_once(body);
    let provider = HttpLlmProvider::new(local_config(base_url)).unwrap();

    let (events_tx, _events_rx) = mpsc::channel(64);
    let outcome = provider.stream(&request(), events_tx).await;
    assert!(matches!(outcome, Err(LlmError::Protocol(_))));
}

/// Tests error frames surface the provider message.
#[tokio::test]
async fn error_frame_surfaces_message() {
    let body = "data: {\"type\":\"response.error\",\"message\":\"model overloaded\"}\n";
    let base_url = serve_once(body);
    let provider = HttpLlmProvider::new(local_config(base_url)).unwrap();

    let (events_tx, _events_rx) = mpsc::channel(64);
    let outcome = provider.stream(&request(), events_tx).await;
    match outcome {
        Err(LlmError::Api(message)) => assert!(message.contains("model overloaded")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

// ============================================================================
// SECTION: Policy Tests
// ============================================================================

/// Tests cleartext base URLs are refused by default.
#[test]
fn cleartext_base_url_is_refused() {
    let config = HttpLlmConfig::new("http://example.test", "key");
    assert!(matches!(HttpLlmProvider::new(config), Err(LlmError::Api(_))));
}
