// crates/p2n-agents/src/events.rs
// ============================================================================
// Module: Provider Event Variants
// Description: Tagged events emitted by the streaming LLM provider.
// Purpose: Keep provider wire shapes out of the pipeline.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The provider's streaming API emits a small, closed set of event kinds.
//! They are modeled as a tagged variant and processed with exhaustive
//! matching; raw provider payloads never travel past this boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Events emitted while a provider response streams.
///
/// # Invariants
/// - Variants are stable; the harness matches exhaustively.
/// - `Completed` is always the final event of a successful stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// Incremental text output.
    TextDelta {
        /// Text fragment.
        delta: String,
    },
    /// The hosted file-search tool was invoked.
    FileSearchCall {
        /// Search query when reported.
        query: Option<String>,
    },
    /// The hosted web-search tool was invoked.
    WebSearchCall {
        /// Search query when reported.
        query: Option<String>,
    },
    /// A function tool call began.
    FunctionCallStart {
        /// Function tool name.
        name: String,
    },
    /// Incremental function-call arguments.
    FunctionArgumentsDelta {
        /// Function tool name.
        name: String,
        /// Argument text fragment.
        delta: String,
    },
    /// The response finished streaming.
    Completed,
}
