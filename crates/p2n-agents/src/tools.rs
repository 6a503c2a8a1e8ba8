// crates/p2n-agents/src/tools.rs
// ============================================================================
// Module: Agent Tools and Usage Caps
// Description: Typed tool specifications and per-run usage tracking.
// Purpose: Bind tools to agent roles and enforce hosted-tool caps.
// Dependencies: p2n-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Tool lists are built per agent role from typed specifications; function
//! tool schemas come from contract records, never hand-threaded provider
//! JSON. Usage caps are carried as a per-call tracker so concurrent runs
//! never share counters.
//!
//! Security posture: tool outputs are untrusted model-controlled input; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::IndexHandle;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Function Contracts
// ============================================================================

/// A typed function tool contract with a derived JSON schema.
///
/// # Invariants
/// - `parameters` is a complete JSON-schema object for the arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionContract {
    /// Function tool name.
    pub name: String,
    /// Human-readable purpose shown to the model.
    pub description: String,
    /// JSON schema for the function arguments.
    pub parameters: Value,
}

// ============================================================================
// SECTION: Tool Specifications
// ============================================================================

/// Tool specification bound to an agent role.
///
/// # Invariants
/// - `FileSearch` always names the index it searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolSpec {
    /// Hosted file search over a provider-side index.
    FileSearch {
        /// Index handle to search.
        index: IndexHandle,
        /// Maximum results per call.
        max_results: u32,
    },
    /// Hosted web search.
    WebSearch,
    /// Function tool with a strict schema.
    Function {
        /// The typed contract.
        contract: FunctionContract,
    },
}

// ============================================================================
// SECTION: Usage Caps
// ============================================================================

/// Per-run hosted tool caps.
///
/// # Invariants
/// - Caps are fixed for the lifetime of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCaps {
    /// File-search calls allowed per run.
    pub file_search_calls: u32,
    /// Web-search calls allowed per run.
    pub web_search_calls: u32,
    /// Code-interpreter seconds allowed per run.
    pub code_interpreter_seconds: u32,
}

impl Default for ToolCaps {
    fn default() -> Self {
        Self {
            file_search_calls: 10,
            web_search_calls: 5,
            code_interpreter_seconds: 60,
        }
    }
}

/// Cap violation raised by the usage tracker.
///
/// # Invariants
/// - `used` is the count including the rejected call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tool cap exceeded for {tool}: {used} > {cap}")]
pub struct CapExceeded {
    /// Tool label.
    pub tool: &'static str,
    /// Calls attempted including the rejected one.
    pub used: u32,
    /// Configured cap.
    pub cap: u32,
}

/// Per-run tool usage tracker.
///
/// # Invariants
/// - A call at exactly the cap value is allowed; the next call is refused.
/// - Trackers are never shared across runs.
#[derive(Debug, Clone)]
pub struct ToolUsage {
    /// Configured caps.
    caps: ToolCaps,
    /// File-search calls observed.
    file_search_used: u32,
    /// Web-search calls observed.
    web_search_used: u32,
}

impl ToolUsage {
    /// Creates a tracker with the given caps.
    #[must_use]
    pub const fn new(caps: ToolCaps) -> Self {
        Self {
            caps,
            file_search_used: 0,
            web_search_used: 0,
        }
    }

    /// Records one file-search call.
    ///
    /// # Errors
    ///
    /// Returns [`CapExceeded`] when the call goes past the cap.
    pub fn record_file_search(&mut self) -> Result<(), CapExceeded> {
        self.file_search_used += 1;
        if self.file_search_used > self.caps.file_search_calls {
            return Err(CapExceeded {
                tool: "file_search",
                used: self.file_search_used,
                cap: self.caps.file_search_calls,
            });
        }
        Ok(())
    }

    /// Records one web-search call.
    ///
    /// # Errors
    ///
    /// Returns [`CapExceeded`] when the call goes past the cap.
    pub fn record_web_search(&mut self) -> Result<(), CapExceeded> {
        self.web_search_used += 1;
        if self.web_search_used > self.caps.web_search_calls {
            return Err(CapExceeded {
                tool: "web_search",
                used: self.web_search_used,
                cap: self.caps.web_search_calls,
            });
        }
        Ok(())
    }

    /// Returns file-search calls observed so far.
    #[must_use]
    pub const fn file_search_used(&self) -> u32 {
        self.file_search_used
    }

    /// Returns web-search calls observed so far.
    #[must_use]
    pub const fn web_search_used(&self) -> u32 {
        self.web_search_used
    }
}

// ============================================================================
// SECTION: Schema Builders
// ============================================================================

/// JSON-schema builders used by contract records.
///
/// These helpers keep function schemas assembled from typed parts so the
/// shape lives in one place per contract.
pub mod schema {
    use serde_json::Value;
    use serde_json::json;

    /// Builds an object schema from properties and required keys.
    #[must_use]
    pub fn object(properties: Value, required: &[&str]) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Builds a string property schema.
    #[must_use]
    pub fn string(description: &str) -> Value {
        json!({ "type": "string", "description": description })
    }

    /// Builds a number property schema.
    #[must_use]
    pub fn number(description: &str) -> Value {
        json!({ "type": "number", "description": description })
    }

    /// Builds an integer property schema.
    #[must_use]
    pub fn integer(description: &str) -> Value {
        json!({ "type": "integer", "description": description })
    }

    /// Builds a boolean property schema.
    #[must_use]
    pub fn boolean(description: &str) -> Value {
        json!({ "type": "boolean", "description": description })
    }

    /// Builds an array property schema over an item schema.
    #[must_use]
    pub fn array(items: Value, description: &str) -> Value {
        json!({ "type": "array", "items": items, "description": description })
    }
}
