// crates/p2n-planner/src/error.rs
// ============================================================================
// Module: Planner Errors
// Description: Typed errors raised during plan synthesis and sanitization.
// Purpose: Map every synthesis failure onto a stable pipeline error code.
// Dependencies: p2n-agents, p2n-core, thiserror
// ============================================================================

//! ## Overview
//! Synthesis failures split into caller faults (bad budget, no claims),
//! policy refusals (no allowed dataset), and model faults (schema, two-stage
//! collapse). Each variant maps onto exactly one [`ErrorCode`] so the
//! pipeline surfaces it without inspection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_agents::AgentError;
use p2n_core::ErrorCode;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Plan synthesis and sanitization errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Requested budget was zero.
    #[error("budget must be at least one minute")]
    InvalidBudget,
    /// Requested budget exceeded the request ceiling.
    #[error("budget {0} exceeds the request ceiling")]
    BudgetExceedsPolicy(u32),
    /// No claims were selected for planning.
    #[error("no claims selected")]
    NoClaimsSelected,
    /// The final plan has no allowed dataset.
    #[error("no allowed datasets remain after sanitization")]
    NoAllowedDatasets,
    /// A required justification is missing or empty.
    #[error("required justification missing: {0}")]
    JustificationMissing(String),
    /// The plan carries no primary metric.
    #[error("primary metric missing")]
    PrimaryMetricMissing,
    /// The plan document failed schema validation.
    #[error("plan schema invalid: {0}")]
    SchemaInvalid(String),
    /// Both shaping attempts, the rescue, and the fallback parse failed.
    #[error("two-stage synthesis failed: {0}")]
    TwoStageFailed(String),
    /// The agent harness failed underneath synthesis.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl PlanError {
    /// Returns the pipeline error code for the failure.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidBudget => ErrorCode::InvalidBudget,
            Self::BudgetExceedsPolicy(_) => ErrorCode::BudgetExceedsPolicy,
            Self::NoClaimsSelected => ErrorCode::NoClaimsSelected,
            Self::NoAllowedDatasets => ErrorCode::PlanNoAllowedDatasets,
            Self::JustificationMissing(_) => ErrorCode::JustificationMissing,
            Self::PrimaryMetricMissing => ErrorCode::PrimaryMetricMissing,
            Self::SchemaInvalid(_) => ErrorCode::PlanSchemaInvalid,
            Self::TwoStageFailed(_) => ErrorCode::PlanTwoStageFailed,
            Self::Agent(agent) => match agent {
                AgentError::CapExceeded(_) => ErrorCode::ToolCapExceeded,
                AgentError::Tripwire(_) => ErrorCode::GuardrailTripped,
                AgentError::Provider(_) => ErrorCode::LlmApiFailure,
                AgentError::MissingFunctionCall {
                    ..
                }
                | AgentError::MalformedOutput(_) => ErrorCode::PlanSchemaInvalid,
            },
        }
    }
}
