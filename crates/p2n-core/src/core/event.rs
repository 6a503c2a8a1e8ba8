// crates/p2n-core/src/core/event.rs
// ============================================================================
// Module: Paper2Notebook Stream Events
// Description: Client-facing event variants for live stage streams.
// Purpose: Model the finite event vocabulary as a tagged variant.
// Dependencies: crate::core::{entity, error, identifiers}, serde, serde_json
// ============================================================================

//! ## Overview
//! Stages that stream (extract, plan stage 1, run) publish these events
//! through the run-stream broker. The vocabulary is closed except for
//! [`StreamEvent::Domain`], which forwards notebook-raised events verbatim.
//! Serialization happens once at the delivery edge: `name()` supplies the
//! event label and `payload()` the JSON body.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::entity::Stage;
use crate::core::error::ErrorCode;
use crate::core::identifiers::PaperId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Stream Events
// ============================================================================

/// Client-facing events published on stage streams.
///
/// # Invariants
/// - Event labels are stable; payload keys are append-only.
/// - `Domain` payloads pass through unmodified.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A stage transition occurred.
    StageUpdate {
        /// Stage entered.
        stage: Stage,
        /// Owning paper when the event is paper-scoped.
        paper_id: Option<PaperId>,
        /// Owning run when the event is run-scoped.
        run_id: Option<RunId>,
    },
    /// Coarse progress for the active stage.
    Progress {
        /// Percent complete, 0 through 100.
        percent: u8,
    },
    /// Free-form log line for display.
    LogLine {
        /// Log message.
        message: String,
    },
    /// Token delta while an agent is streaming text.
    Token {
        /// Text delta.
        delta: String,
        /// Agent role label when known.
        agent: Option<String>,
    },
    /// The agent invoked the hosted file-search tool.
    FileSearchCall {
        /// Search query when the provider reports one.
        query: Option<String>,
    },
    /// Notebook-raised event forwarded verbatim by the executor.
    Domain {
        /// Event type label from the notebook.
        event_type: String,
        /// Payload from the notebook.
        payload: Value,
    },
    /// Terminal error for the stream.
    Error {
        /// Typed code.
        code: ErrorCode,
        /// Human message.
        message: String,
    },
}

impl StreamEvent {
    /// Returns the event label used on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::StageUpdate {
                ..
            } => "stage_update",
            Self::Progress {
                ..
            } => "progress",
            Self::LogLine {
                ..
            } => "log_line",
            Self::Token {
                ..
            } => "token",
            Self::FileSearchCall {
                ..
            } => "file_search_call",
            Self::Domain {
                event_type, ..
            } => event_type,
            Self::Error {
                ..
            } => "error",
        }
    }

    /// Returns the JSON payload body for the event.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::StageUpdate {
                stage,
                paper_id,
                run_id,
            } => {
                let mut body = json!({ "stage": stage.as_str() });
                if let Some(paper_id) = paper_id
                    && let Some(map) = body.as_object_mut()
                {
                    map.insert("paper_id".to_string(), json!(paper_id));
                }
                if let Some(run_id) = run_id
                    && let Some(map) = body.as_object_mut()
                {
                    map.insert("run_id".to_string(), json!(run_id));
                }
                body
            }
            Self::Progress {
                percent,
            } => json!({ "percent": percent }),
            Self::LogLine {
                message,
            } => json!({ "message": message }),
            Self::Token {
                delta,
                agent,
            } => match agent {
                Some(agent) => json!({ "delta": delta, "agent": agent }),
                None => json!({ "delta": delta }),
            },
            Self::FileSearchCall {
                query,
            } => match query {
                Some(query) => json!({ "query": query }),
                None => json!({}),
            },
            Self::Domain {
                payload, ..
            } => payload.clone(),
            Self::Error {
                code,
                message,
            } => json!({ "code": code.as_str(), "message": message }),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use serde_json::json;

    use super::StreamEvent;
    use crate::core::entity::Stage;
    use crate::core::error::ErrorCode;
    use crate::core::identifiers::PaperId;

    /// Tests stage updates carry the owning paper.
    #[test]
    fn stage_update_carries_paper() {
        let event = StreamEvent::StageUpdate {
            stage: Stage::Extract,
            paper_id: Some(PaperId::new("paper-1")),
            run_id: None,
        };
        assert_eq!(event.name(), "stage_update");
        assert_eq!(event.payload(), json!({ "stage": "extract", "paper_id": "paper-1" }));
    }

    /// Tests domain events pass their label and payload through verbatim.
    #[test]
    fn domain_event_passes_through() {
        let event = StreamEvent::Domain {
            event_type: "metric_update".to_string(),
            payload: json!({ "metric": "accuracy", "value": 0.9, "split": "test" }),
        };
        assert_eq!(event.name(), "metric_update");
        assert_eq!(event.payload()["metric"], "accuracy");
    }

    /// Tests error events expose the machine code.
    #[test]
    fn error_event_exposes_code() {
        let event = StreamEvent::Error {
            code: ErrorCode::RunTimeout,
            message: "budget exhausted".to_string(),
        };
        assert_eq!(event.payload()["code"], "RUN_TIMEOUT");
    }
}
