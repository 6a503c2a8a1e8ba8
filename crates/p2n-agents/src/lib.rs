// crates/p2n-agents/src/lib.rs
// ============================================================================
// Module: Paper2Notebook Agents Library
// Description: Agent runtime harness over a streaming LLM provider.
// Purpose: Enforce tool caps, guardrails, and structured outputs.
// Dependencies: async-trait, p2n-core, reqwest, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! `p2n-agents` wraps the provider's streaming response API with the policy
//! machinery the pipeline relies on: per-run tool usage caps, typed function
//! contracts with derived schemas, output guardrails, a single JSON-rescue
//! pass for malformed function arguments, and event fan-out to stage
//! streams.
//!
//! Invariants:
//! - Usage trackers are per run; no shared mutable counters.
//! - The rescue pass runs at most once per structured output.
//!
//! Security posture: model output and tool results are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod events;
pub mod guardrails;
pub mod harness;
pub mod http;
pub mod provider;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use events::ProviderEvent;
pub use guardrails::FnGuardrail;
pub use guardrails::GuardrailTripwire;
pub use guardrails::OutputGuardrail;
pub use guardrails::apply_guardrails;
pub use harness::AgentError;
pub use harness::AgentHarness;
pub use harness::AgentRole;
pub use harness::extract_json_object;
pub use http::HttpLlmConfig;
pub use http::HttpLlmProvider;
pub use provider::AgentRequest;
pub use provider::AgentResponse;
pub use provider::FunctionCall;
pub use provider::LlmError;
pub use provider::LlmProvider;
pub use tools::CapExceeded;
pub use tools::FunctionContract;
pub use tools::ToolCaps;
pub use tools::ToolSpec;
pub use tools::ToolUsage;
pub use tools::schema;

#[cfg(test)]
mod tests;
