// crates/p2n-agents/src/tests.rs
// ============================================================================
// Module: Agent Harness Tests
// Description: Tests for caps, structured outputs, rescue, and guardrails.
// Purpose: Exercise the harness against a scripted in-process provider.
// Dependencies: p2n-agents, serde, tokio
// ============================================================================

//! ## Overview
//! Validates tool-cap enforcement, structured-output parsing, the single
//! JSON-rescue pass, and guardrail tripwires.

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

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::AgentError;
use crate::AgentHarness;
use crate::AgentRequest;
use crate::AgentResponse;
use crate::FnGuardrail;
use crate::FunctionCall;
use crate::FunctionContract;
use crate::LlmError;
use crate::LlmProvider;
use crate::OutputGuardrail;
use crate::ProviderEvent;
use crate::ToolCaps;
use crate::extract_json_object;
use crate::schema;

// ============================================================================
// SECTION: Scripted Provider
// ============================================================================

/// One scripted provider turn: events to emit, then a response.
struct ScriptedTurn {
    /// Events emitted before completing.
    events: Vec<ProviderEvent>,
    /// Response returned on completion.
    response: AgentResponse,
}

/// Provider that replays scripted turns in order.
struct ScriptedProvider {
    /// Remaining turns, consumed front to back.
    turns: Mutex<Vec<ScriptedTurn>>,
    /// Requests observed, for assertions.
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedProvider {
    /// Creates a provider from scripted turns.
    fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream(
        &self,
        request: &AgentRequest,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<AgentResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(LlmError::Api("no scripted turn".to_string()));
            }
            turns.remove(0)
        };
        for event in turn.events {
            if events.send(event).await.is_err() {
                return Err(LlmError::Cancelled);
            }
        }
        if events.send(ProviderEvent::Completed).await.is_err() {
            return Err(LlmError::Cancelled);
        }
        Ok(turn.response)
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Structured output shape used by harness tests.
#[derive(Debug, PartialEq, Deserialize)]
struct Sheet {
    /// Item list.
    items: Vec<String>,
}

/// Returns a request fixture with no tools.
fn request() -> AgentRequest {
    AgentRequest {
        model: "model-1".to_string(),
        instructions: "test".to_string(),
        input: "test".to_string(),
        temperature: 0.0,
        max_output_tokens: 256,
        tools: Vec::new(),
    }
}

/// Returns the sheet function contract.
fn sheet_contract() -> FunctionContract {
    FunctionContract {
        name: "record_sheet".to_string(),
        description: "Record the item sheet.".to_string(),
        parameters: schema::object(
            serde_json::json!({ "items": schema::array(schema::string("item"), "items") }),
            &["items"],
        ),
    }
}

/// Returns caps with a file-search limit of two.
const fn small_caps() -> ToolCaps {
    ToolCaps {
        file_search_calls: 2,
        web_search_calls: 1,
        code_interpreter_seconds: 60,
    }
}

/// Returns a harness over the given provider.
fn harness(provider: Arc<ScriptedProvider>) -> AgentHarness {
    AgentHarness::new(provider, small_caps(), "rescue-model", 256)
}

/// Returns a file-search event fixture.
fn file_search() -> ProviderEvent {
    ProviderEvent::FileSearchCall {
        query: Some("accuracy".to_string()),
    }
}

// ============================================================================
// SECTION: Cap Tests
// ============================================================================

/// Tests calls at exactly the cap are allowed.
#[tokio::test]
async fn file_search_at_cap_is_allowed() {
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn {
        events: vec![file_search(), file_search()],
        response: AgentResponse::default(),
    }]));
    let outcome = harness(provider).run(&request(), None).await;
    assert!(outcome.is_ok());
}

/// Tests one call past the cap raises the policy error.
#[tokio::test]
async fn file_search_past_cap_is_refused() {
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn {
        events: vec![file_search(), file_search(), file_search()],
        response: AgentResponse::default(),
    }]));
    let outcome = harness(provider).run(&request(), None).await;
    match outcome {
        Err(AgentError::CapExceeded(cap)) => {
            assert_eq!(cap.tool, "file_search");
            assert_eq!(cap.cap, 2);
            assert_eq!(cap.used, 3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// Tests events are forwarded to the caller's channel.
#[tokio::test]
async fn events_are_forwarded() {
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn {
        events: vec![
            ProviderEvent::TextDelta {
                delta: "hel".to_string(),
            },
            ProviderEvent::TextDelta {
                delta: "lo".to_string(),
            },
        ],
        response: AgentResponse::default(),
    }]));
    let (forward_tx, mut forward_rx) = mpsc::channel(16);
    harness(provider).run(&request(), Some(forward_tx)).await.unwrap();

    let mut deltas = String::new();
    while let Some(event) = forward_rx.recv().await {
        if let ProviderEvent::TextDelta {
            delta,
        } = event
        {
            deltas.push_str(&delta);
        }
    }
    assert_eq!(deltas, "hello");
}

// ============================================================================
// SECTION: Structured Output Tests
// ============================================================================

/// Tests a well-formed function call parses without rescue.
#[tokio::test]
async fn structured_output_parses_directly() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let response = AgentResponse {
        text: String::new(),
        function_calls: vec![FunctionCall {
            name: "record_sheet".to_string(),
            arguments: "{\"items\": [\"a\", \"b\"]}".to_string(),
        }],
    };
    let sheet: Sheet = harness(provider.clone())
        .structured(&response, &sheet_contract(), &[])
        .await
        .unwrap();
    assert_eq!(sheet.items, vec!["a", "b"]);
    assert!(provider.requests.lock().unwrap().is_empty(), "no rescue call expected");
}

/// Tests malformed arguments trigger exactly one rescue pass.
#[tokio::test]
async fn malformed_output_uses_one_rescue_pass() {
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn {
        events: Vec::new(),
        response: AgentResponse {
            text: "Here is the fix: {\"items\": [\"a\"]} hope that helps".to_string(),
            function_calls: Vec::new(),
        },
    }]));
    let response = AgentResponse {
        text: String::new(),
        function_calls: vec![FunctionCall {
            name: "record_sheet".to_string(),
            arguments: "{\"items\": [\"a\",]}".to_string(),
        }],
    };
    let sheet: Sheet = harness(provider.clone())
        .structured(&response, &sheet_contract(), &[])
        .await
        .unwrap();
    assert_eq!(sheet.items, vec!["a"]);

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1, "exactly one rescue call");
    assert_eq!(requests[0].model, "rescue-model");
}

/// Tests a missing function call is a typed failure.
#[tokio::test]
async fn missing_function_call_is_typed() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let response = AgentResponse::default();
    let outcome: Result<Sheet, _> =
        harness(provider).structured(&response, &sheet_contract(), &[]).await;
    assert!(matches!(outcome, Err(AgentError::MissingFunctionCall { .. })));
}

/// Tests a failing guardrail raises a tripwire.
#[tokio::test]
async fn guardrail_tripwire_raises() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let response = AgentResponse {
        text: String::new(),
        function_calls: vec![FunctionCall {
            name: "record_sheet".to_string(),
            arguments: "{\"items\": []}".to_string(),
        }],
    };
    let non_empty = FnGuardrail::<Sheet>::new("non_empty_items", |sheet| {
        if sheet.items.is_empty() {
            return Err("at least one item is required".to_string());
        }
        Ok(())
    });
    let guardrails: Vec<&dyn OutputGuardrail<Sheet>> = vec![&non_empty];
    let outcome: Result<Sheet, _> =
        harness(provider).structured(&response, &sheet_contract(), &guardrails).await;
    match outcome {
        Err(AgentError::Tripwire(tripwire)) => {
            assert_eq!(tripwire.guardrail, "non_empty_items");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

// ============================================================================
// SECTION: JSON Extraction Tests
// ============================================================================

/// Tests extraction finds the outermost object in prose.
#[test]
fn json_extraction_spans_nested_objects() {
    let text = "Sure! {\"a\": {\"b\": \"} tricky\"}, \"c\": 1} done";
    assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": \"} tricky\"}, \"c\": 1}"));
}

/// Tests extraction returns nothing for brace-free text.
#[test]
fn json_extraction_handles_absence() {
    assert_eq!(extract_json_object("no json here"), None);
    assert_eq!(extract_json_object("{unclosed"), None);
}
