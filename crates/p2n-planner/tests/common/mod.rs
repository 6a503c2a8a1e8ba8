// crates/p2n-planner/tests/common/mod.rs
// ============================================================================
// Module: Planner Test Fixtures
// Description: Shared fixtures for sanitizer and synthesis tests.
// Purpose: Build papers, claims, and scripted providers in one place.
// Dependencies: p2n-agents, p2n-core
// ============================================================================
//! ## Overview
//! Shared fixtures for planner integration tests.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only fixtures; not every test uses every helper."
)]

use std::sync::Mutex;

use async_trait::async_trait;
use p2n_agents::AgentRequest;
use p2n_agents::AgentResponse;
use p2n_agents::LlmError;
use p2n_agents::LlmProvider;
use p2n_agents::ProviderEvent;
use p2n_core::Claim;
use p2n_core::ClaimId;
use p2n_core::DatasetUpload;
use p2n_core::Paper;
use p2n_core::PaperId;
use p2n_core::PaperStatus;
use p2n_core::Stage;
use p2n_core::Timestamp;
use p2n_core::UploadFormat;
use tokio::sync::mpsc;

/// Returns a paper fixture, optionally carrying a dataset upload.
pub fn paper(upload_filename: Option<&str>) -> Paper {
    Paper {
        id: PaperId::new("paper-1"),
        title: "Convolutional Networks for Sentence Classification".to_string(),
        source_url: None,
        pdf_path: "papers/dev/2024/03/05/paper-1.pdf".to_string(),
        checksum: "11".repeat(32),
        index_handle: Some("index-1".into()),
        dataset_upload: upload_filename.map(|name| DatasetUpload {
            blob_path: "papers/dev/2024/03/05/paper-1.dataset.xls".to_string(),
            format: UploadFormat::Xls,
            original_filename: name.to_string(),
        }),
        stage: Stage::Plan,
        status: PaperStatus::Processing,
        created_at: Timestamp::from_unix_millis(0),
        updated_at: Timestamp::from_unix_millis(0),
    }
}

/// Returns a claim fixture for the given dataset and metric.
pub fn claim(dataset: &str, metric: &str, value: f64) -> Claim {
    Claim {
        id: ClaimId::new("claim-1"),
        paper_id: PaperId::new("paper-1"),
        dataset_name: dataset.to_string(),
        split: Some("test".to_string()),
        metric_name: metric.to_string(),
        metric_value: value,
        units: "%".to_string(),
        method_snippet: None,
        source_citation: "Table 2".to_string(),
        confidence: 0.95,
        dataset_format: None,
        target_column: None,
        preprocessing_notes: None,
        dataset_url: None,
    }
}

/// One scripted provider turn: events to emit, then a response or failure.
pub struct ScriptedTurn {
    /// Events emitted before completing.
    pub events: Vec<ProviderEvent>,
    /// Response returned on completion.
    pub response: AgentResponse,
}

impl ScriptedTurn {
    /// Returns a turn that emits no events and returns only text.
    pub fn text(text: &str) -> Self {
        Self {
            events: Vec::new(),
            response: AgentResponse {
                text: text.to_string(),
                function_calls: Vec::new(),
            },
        }
    }

    /// Returns a turn that answers with one function call.
    pub fn function_call(name: &str, arguments: &str) -> Self {
        Self {
            events: Vec::new(),
            response: AgentResponse {
                text: String::new(),
                function_calls: vec![p2n_agents::FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
            },
        }
    }
}

/// Provider that replays scripted turns in order.
pub struct ScriptedProvider {
    /// Remaining turns, consumed front to back.
    turns: Mutex<Vec<ScriptedTurn>>,
    /// Requests observed, for assertions.
    pub requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedProvider {
    /// Creates a provider from scripted turns.
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
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
