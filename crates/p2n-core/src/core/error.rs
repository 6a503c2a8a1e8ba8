// crates/p2n-core/src/core/error.rs
// ============================================================================
// Module: Paper2Notebook Error Taxonomy
// Description: Typed error codes surfaced at stage boundaries.
// Purpose: Provide stable machine identifiers with kind classification.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every stage failure is surfaced as a typed code with a stable machine
//! identifier, a kind classification, and an optional remediation hint.
//! Streaming stages additionally emit a final `error` event carrying the same
//! code. Codes are append-only; renaming an existing code is a breaking
//! change for clients.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Coarse classification of a typed error code.
///
/// # Invariants
/// - Variants are stable for serialization and client handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller fault: bad input or missing prerequisite.
    Input,
    /// Core refusal: a policy ceiling or block-list was hit.
    Policy,
    /// LLM or data-shape fault: output failed schema or guardrail checks.
    Schema,
    /// Provider or storage fault outside the core.
    External,
    /// Generator fault caught by the notebook validator.
    Validation,
    /// Runtime fault inside the execution sandbox.
    Execution,
}

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable machine-readable error codes for stage failures.
///
/// # Invariants
/// - Wire identifiers are SCREAMING_SNAKE_CASE and append-only.
/// - `kind` assignment follows the propagation policy: Input and Policy codes
///   never mutate entity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Uploaded payload was not a PDF.
    UnsupportedMediaType,
    /// Uploaded payload exceeded the ingest size ceiling.
    PayloadTooLarge,
    /// Fetching the paper URL failed or timed out.
    UrlFetchFailed,
    /// Paper identifier does not exist.
    PaperNotFound,
    /// Plan identifier does not exist.
    PlanNotFound,
    /// Run identifier does not exist.
    RunNotFound,
    /// Paper has no searchable index yet.
    PaperNotReady,
    /// Plan has no environment fingerprint yet.
    PlanNotMaterialized,
    /// Requested budget was zero or negative.
    InvalidBudget,
    /// Plan request selected no claims.
    NoClaimsSelected,
    /// Requested stage is not legal from the paper's current stage.
    IllegalStageTransition,
    /// A hosted tool exceeded its per-run usage cap.
    #[serde(rename = "POLICY_CAP_EXCEEDED")]
    ToolCapExceeded,
    /// Requested budget exceeds the policy ceiling.
    BudgetExceedsPolicy,
    /// Dataset is on the block-list.
    DatasetBlocked,
    /// Plan ended with no allowed dataset after sanitization.
    PlanNoAllowedDatasets,
    /// GPU use was requested or detected; execution is CPU-only.
    GpuRequested,
    /// Verify stage is a placeholder and cannot be entered.
    VerifierNotImplemented,
    /// Plan JSON failed schema validation after shaping and rescue.
    PlanSchemaInvalid,
    /// Both planner passes and the fallback parse failed.
    PlanTwoStageFailed,
    /// A required justification is missing or empty.
    JustificationMissing,
    /// The plan carries no primary metric.
    PrimaryMetricMissing,
    /// A structured-output guardrail rejected the agent output.
    GuardrailTripped,
    /// LLM provider call failed.
    LlmApiFailure,
    /// Searchable index creation failed.
    IndexCreationFailed,
    /// Blob store read or write failed.
    BlobStoreFailure,
    /// Metadata store operation failed.
    MetadataStoreFailure,
    /// Notebook failed static validation; the artifact was not persisted.
    NotebookValidationFailed,
    /// A notebook cell raised during execution.
    CellExecutionFailed,
    /// `metrics.json` is absent or lacks the primary metric.
    MetricsMissing,
    /// The run exceeded its wall-clock budget.
    RunTimeout,
}

impl ErrorCode {
    /// Returns the stable machine identifier for the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UrlFetchFailed => "URL_FETCH_FAILED",
            Self::PaperNotFound => "PAPER_NOT_FOUND",
            Self::PlanNotFound => "PLAN_NOT_FOUND",
            Self::RunNotFound => "RUN_NOT_FOUND",
            Self::PaperNotReady => "PAPER_NOT_READY",
            Self::PlanNotMaterialized => "PLAN_NOT_MATERIALIZED",
            Self::InvalidBudget => "INVALID_BUDGET",
            Self::NoClaimsSelected => "NO_CLAIMS_SELECTED",
            Self::IllegalStageTransition => "ILLEGAL_STAGE_TRANSITION",
            Self::ToolCapExceeded => "POLICY_CAP_EXCEEDED",
            Self::BudgetExceedsPolicy => "BUDGET_EXCEEDS_POLICY",
            Self::DatasetBlocked => "DATASET_BLOCKED",
            Self::PlanNoAllowedDatasets => "PLAN_NO_ALLOWED_DATASETS",
            Self::GpuRequested => "GPU_REQUESTED",
            Self::VerifierNotImplemented => "VERIFIER_NOT_IMPLEMENTED",
            Self::PlanSchemaInvalid => "PLAN_SCHEMA_INVALID",
            Self::PlanTwoStageFailed => "PLAN_TWO_STAGE_FAILED",
            Self::JustificationMissing => "JUSTIFICATION_MISSING",
            Self::PrimaryMetricMissing => "PRIMARY_METRIC_MISSING",
            Self::GuardrailTripped => "GUARDRAIL_TRIPPED",
            Self::LlmApiFailure => "LLM_API_FAILURE",
            Self::IndexCreationFailed => "INDEX_CREATION_FAILED",
            Self::BlobStoreFailure => "BLOB_STORE_FAILURE",
            Self::MetadataStoreFailure => "METADATA_STORE_FAILURE",
            Self::NotebookValidationFailed => "NOTEBOOK_VALIDATION_FAILED",
            Self::CellExecutionFailed => "CELL_EXECUTION_FAILED",
            Self::MetricsMissing => "METRICS_MISSING",
            Self::RunTimeout => "RUN_TIMEOUT",
        }
    }

    /// Returns the coarse kind for the code.
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::UnsupportedMediaType
            | Self::PayloadTooLarge
            | Self::UrlFetchFailed
            | Self::PaperNotFound
            | Self::PlanNotFound
            | Self::RunNotFound
            | Self::PaperNotReady
            | Self::PlanNotMaterialized
            | Self::InvalidBudget
            | Self::NoClaimsSelected
            | Self::IllegalStageTransition => ErrorKind::Input,
            Self::ToolCapExceeded
            | Self::BudgetExceedsPolicy
            | Self::DatasetBlocked
            | Self::PlanNoAllowedDatasets
            | Self::GpuRequested
            | Self::VerifierNotImplemented => ErrorKind::Policy,
            Self::PlanSchemaInvalid
            | Self::PlanTwoStageFailed
            | Self::JustificationMissing
            | Self::PrimaryMetricMissing
            | Self::GuardrailTripped => ErrorKind::Schema,
            Self::LlmApiFailure
            | Self::IndexCreationFailed
            | Self::BlobStoreFailure
            | Self::MetadataStoreFailure => ErrorKind::External,
            Self::NotebookValidationFailed => ErrorKind::Validation,
            Self::CellExecutionFailed | Self::MetricsMissing | Self::RunTimeout => {
                ErrorKind::Execution
            }
        }
    }

    /// Returns a remediation hint for user display when one exists.
    #[must_use]
    pub const fn remediation(self) -> Option<&'static str> {
        match self {
            Self::UnsupportedMediaType => Some("Upload a PDF file."),
            Self::PayloadTooLarge => Some("PDFs are capped at 15 MiB."),
            Self::PaperNotReady => Some("Run ingest before extract."),
            Self::PlanNotMaterialized => Some("Run materialize before starting a run."),
            Self::InvalidBudget => Some("Budgets are whole minutes between 1 and 120."),
            Self::DatasetBlocked | Self::PlanNoAllowedDatasets => {
                Some("Pick a registry dataset or attach a dataset upload to the paper.")
            }
            Self::GpuRequested => Some("Execution is CPU-only; remove GPU requirements."),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Typed Error
// ============================================================================

/// A typed stage error pairing a code with a human message.
///
/// # Invariants
/// - `message` never embeds raw provider payloads or secrets.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct TypedError {
    /// Stable machine code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl TypedError {
    /// Creates a typed error from a code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
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

    use super::ErrorCode;
    use super::ErrorKind;

    /// Tests wire identifiers match serde rendering.
    #[test]
    fn wire_identifier_matches_serde() {
        let rendered = serde_json::to_string(&ErrorCode::PlanNoAllowedDatasets).unwrap();
        assert_eq!(rendered, "\"PLAN_NO_ALLOWED_DATASETS\"");
        assert_eq!(ErrorCode::PlanNoAllowedDatasets.as_str(), "PLAN_NO_ALLOWED_DATASETS");
    }

    /// Tests the tool cap code keeps its historical identifier.
    #[test]
    fn tool_cap_identifier_is_policy_cap() {
        assert_eq!(ErrorCode::ToolCapExceeded.as_str(), "POLICY_CAP_EXCEEDED");
        assert_eq!(ErrorCode::ToolCapExceeded.kind(), ErrorKind::Policy);
    }

    /// Tests execution codes classify as execution faults.
    #[test]
    fn execution_codes_classify() {
        assert_eq!(ErrorCode::RunTimeout.kind(), ErrorKind::Execution);
        assert_eq!(ErrorCode::MetricsMissing.kind(), ErrorKind::Execution);
    }
}
