// crates/p2n-agents/src/harness.rs
// ============================================================================
// Module: Agent Runtime Harness
// Description: Streaming agent runs with caps, structured outputs, and rescue.
// Purpose: Wrap the provider with policy enforcement and output validation.
// Dependencies: crate::{events, guardrails, provider, tools}, serde_json, tokio
// ============================================================================

//! ## Overview
//! The harness owns everything between a raw provider stream and a validated
//! structured output: per-run tool caps, event fan-out to the caller, the
//! single JSON-rescue pass for malformed function arguments, and output
//! guardrails. Each run carries its own usage tracker so concurrent runs
//! never share counters.
//!
//! Security posture: all model output is untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::ProviderEvent;
use crate::guardrails::GuardrailTripwire;
use crate::guardrails::OutputGuardrail;
use crate::guardrails::apply_guardrails;
use crate::provider::AgentRequest;
use crate::provider::AgentResponse;
use crate::provider::LlmError;
use crate::provider::LlmProvider;
use crate::tools::CapExceeded;
use crate::tools::FunctionContract;
use crate::tools::ToolCaps;
use crate::tools::ToolUsage;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Internal event channel capacity between provider and harness.
const EVENT_CHANNEL_CAPACITY: usize = 64;
/// Instructions for the JSON rescue pass.
const RESCUE_INSTRUCTIONS: &str = "You repair malformed JSON. Return only a single JSON object \
                                   that satisfies the provided schema. Do not add commentary.";

// ============================================================================
// SECTION: Agent Roles
// ============================================================================

/// Agent roles recognized by the pipeline.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
/// - `Verifier` is a placeholder role with no behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    /// Claim extraction over the indexed paper.
    Extractor,
    /// Plan reasoning with research tools.
    Reasoner,
    /// Plan shaping into strict JSON.
    Shaper,
    /// Malformed-JSON rescue.
    Rescue,
    /// Placeholder verification role.
    Verifier,
}

impl AgentRole {
    /// Returns a stable label for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extractor => "extractor",
            Self::Reasoner => "reasoner",
            Self::Shaper => "shaper",
            Self::Rescue => "rescue",
            Self::Verifier => "verifier",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Harness errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Provider call failed.
    #[error(transparent)]
    Provider(#[from] LlmError),
    /// A hosted tool exceeded its cap.
    #[error(transparent)]
    CapExceeded(#[from] CapExceeded),
    /// A guardrail rejected the structured output.
    #[error(transparent)]
    Tripwire(#[from] GuardrailTripwire),
    /// The expected function call never arrived.
    #[error("missing function call: {name}")]
    MissingFunctionCall {
        /// Expected function tool name.
        name: String,
    },
    /// Function arguments stayed malformed after the rescue pass.
    #[error("malformed structured output: {0}")]
    MalformedOutput(String),
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Agent runtime harness over a shared provider.
///
/// # Invariants
/// - Usage trackers are created per run, never shared.
/// - The rescue pass executes at most once per structured output.
pub struct AgentHarness {
    /// Shared provider client.
    provider: Arc<dyn LlmProvider>,
    /// Per-run tool caps.
    caps: ToolCaps,
    /// Model used for the JSON rescue pass.
    rescue_model: String,
    /// Output token ceiling for rescue calls.
    rescue_max_tokens: u32,
}

impl AgentHarness {
    /// Creates a harness over a provider with the given caps.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        caps: ToolCaps,
        rescue_model: impl Into<String>,
        rescue_max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            caps,
            rescue_model: rescue_model.into(),
            rescue_max_tokens,
        }
    }

    /// Runs a request, forwarding stream events and enforcing tool caps.
    ///
    /// Events are forwarded best-effort: a closed forward channel stops
    /// forwarding but never aborts the run.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::CapExceeded`] when a hosted tool goes past its
    /// cap, or [`AgentError::Provider`] on provider failure.
    pub async fn run(
        &self,
        request: &AgentRequest,
        forward: Option<mpsc::Sender<ProviderEvent>>,
    ) -> Result<AgentResponse, AgentError> {
        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut usage = ToolUsage::new(self.caps);
        let mut violation: Option<CapExceeded> = None;

        let stream = self.provider.stream(request, events_tx);
        let consume = async {
            while let Some(event) = events_rx.recv().await {
                let counted = match &event {
                    ProviderEvent::FileSearchCall {
                        ..
                    } => usage.record_file_search(),
                    ProviderEvent::WebSearchCall {
                        ..
                    } => usage.record_web_search(),
                    _ => Ok(()),
                };
                if let Err(cap) = counted {
                    violation = Some(cap);
                    // Closing the channel cancels the provider stream.
                    events_rx.close();
                    break;
                }
                if let Some(forward) = &forward
                    && forward.send(event).await.is_err()
                {
                    // Disconnected consumers stop forwarding, not the run.
                    continue;
                }
            }
        };

        let (outcome, ()) = tokio::join!(stream, consume);
        if let Some(cap) = violation {
            return Err(AgentError::CapExceeded(cap));
        }
        Ok(outcome?)
    }

    /// Extracts and validates a structured output from a completed response.
    ///
    /// Parsing failures trigger the JSON rescue pass exactly once; guardrails
    /// run on the parsed value.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MissingFunctionCall`] when the contract's call
    /// is absent, [`AgentError::MalformedOutput`] when parsing fails after
    /// rescue, or [`AgentError::Tripwire`] on guardrail rejection.
    pub async fn structured<T: DeserializeOwned>(
        &self,
        response: &AgentResponse,
        contract: &FunctionContract,
        guardrails: &[&dyn OutputGuardrail<T>],
    ) -> Result<T, AgentError> {
        let call = response
            .function_calls
            .iter()
            .find(|call| call.name == contract.name)
            .ok_or_else(|| AgentError::MissingFunctionCall {
                name: contract.name.clone(),
            })?;

        let value: T = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(first_failure) => {
                let rescued = self.rescue_json(&call.arguments, contract).await?;
                serde_json::from_str(&rescued).map_err(|rescue_failure| {
                    AgentError::MalformedOutput(format!(
                        "initial parse: {first_failure}; after rescue: {rescue_failure}"
                    ))
                })?
            }
        };

        apply_guardrails(&value, guardrails)?;
        Ok(value)
    }

    /// Runs the single JSON rescue pass against the cheaper model.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MalformedOutput`] when the rescue output carries
    /// no JSON object, or [`AgentError::Provider`] on provider failure.
    pub async fn rescue_json(
        &self,
        raw: &str,
        contract: &FunctionContract,
    ) -> Result<String, AgentError> {
        let request = AgentRequest {
            model: self.rescue_model.clone(),
            instructions: RESCUE_INSTRUCTIONS.to_string(),
            input: format!(
                "Schema:\n{}\n\nMalformed output:\n{raw}",
                serde_json::to_string_pretty(&contract.parameters)
                    .unwrap_or_else(|_| contract.parameters.to_string())
            ),
            temperature: 0.0,
            max_output_tokens: self.rescue_max_tokens,
            tools: Vec::new(),
        };
        let response = self.run(&request, None).await?;
        extract_json_object(&response.text)
            .map(ToString::to_string)
            .ok_or_else(|| AgentError::MalformedOutput("rescue pass returned no JSON".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the outermost JSON object from free-form text.
///
/// Scans for the first `{` and matches braces while honoring string
/// literals, so prose before or after the object is tolerated.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}
