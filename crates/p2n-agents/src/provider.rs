// crates/p2n-agents/src/provider.rs
// ============================================================================
// Module: LLM Provider Interface
// Description: Streaming response interface for language-model backends.
// Purpose: Decouple the harness from any specific provider vendor.
// Dependencies: crate::{events, tools}, async-trait, tokio
// ============================================================================

//! ## Overview
//! A provider accepts a request with bound tools, pushes [`ProviderEvent`]s
//! into the caller's channel as they stream, and returns the collected
//! response when the stream completes. Dropping the receiving end of the
//! channel cancels the stream; the provider surfaces that as
//! [`LlmError::Cancelled`] so the harness can substitute its own cause.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::ProviderEvent;
use crate::tools::ToolSpec;

// ============================================================================
// SECTION: Request and Response
// ============================================================================

/// A single agent request against the provider.
///
/// # Invariants
/// - `temperature` is within `[0.0, 2.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Model identifier for this role.
    pub model: String,
    /// System instructions for the role.
    pub instructions: String,
    /// User input text.
    pub input: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output token ceiling.
    pub max_output_tokens: u32,
    /// Tools bound to this request.
    pub tools: Vec<ToolSpec>,
}

/// A collected function tool call.
///
/// # Invariants
/// - `arguments` is the raw argument text; parsing happens in the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function tool name.
    pub name: String,
    /// Raw argument text as streamed.
    pub arguments: String,
}

/// The collected outcome of a completed stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Concatenated text output.
    pub text: String,
    /// Function calls in completion order.
    pub function_calls: Vec<FunctionCall>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provider errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed API keys or full request bodies.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider rejected or failed the request.
    #[error("llm api failure: {0}")]
    Api(String),
    /// The stream exceeded its hard time cap.
    #[error("llm stream timed out after {0} seconds")]
    Timeout(u64),
    /// The caller dropped the event channel mid-stream.
    #[error("llm stream cancelled by consumer")]
    Cancelled,
    /// The provider emitted a frame the client cannot parse.
    #[error("llm protocol violation: {0}")]
    Protocol(String),
}

// ============================================================================
// SECTION: Provider Interface
// ============================================================================

/// Streaming language-model provider.
///
/// Implementations must deliver events in stream order and finish with
/// [`ProviderEvent::Completed`] before returning.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Streams a response, pushing events into `events` as they arrive.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport failure, timeout, protocol
    /// violations, or consumer cancellation.
    async fn stream(
        &self,
        request: &AgentRequest,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<AgentResponse, LlmError>;
}
