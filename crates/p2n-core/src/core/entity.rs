// crates/p2n-core/src/core/entity.rs
// ============================================================================
// Module: Paper2Notebook Entities
// Description: Paper, claim, plan record, run, and run event records.
// Purpose: Capture pipeline state with stable serialization for storage.
// Dependencies: crate::core::{error, identifiers, plan, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Entities mirror the metadata-store rows one to one. A paper owns its
//! claims, plans, runs, and events; deletion cascades. Stage and status
//! transitions are enforced by the pipeline state machine, not by these
//! records.
//!
//! Security posture: records loaded from storage are untrusted on load; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::ErrorCode;
use crate::core::identifiers::ClaimId;
use crate::core::identifiers::IndexHandle;
use crate::core::identifiers::PaperId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::RunId;
use crate::core::plan::PlanV11;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Stages and Statuses
// ============================================================================

/// Pipeline stages in execution order.
///
/// # Invariants
/// - Variants are stable for serialization and transition checks.
/// - `Verify` is a placeholder and is never entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// PDF intake and dedupe.
    Ingest,
    /// Claim extraction from the indexed paper.
    Extract,
    /// Plan synthesis from selected claims.
    Plan,
    /// Notebook materialization and validation.
    Materialize,
    /// Sandboxed notebook execution.
    Run,
    /// Claimed-versus-observed reporting.
    Report,
    /// Placeholder verification stage; never entered.
    Verify,
}

impl Stage {
    /// Returns the stable wire label for the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Extract => "extract",
            Self::Plan => "plan",
            Self::Materialize => "materialize",
            Self::Run => "run",
            Self::Report => "report",
            Self::Verify => "verify",
        }
    }
}

/// Paper lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    /// Created, no stage in flight.
    Pending,
    /// A stage is currently executing.
    Processing,
    /// The most recent stage completed.
    Completed,
    /// The most recent stage failed.
    Failed,
}

/// Run lifecycle status.
///
/// # Invariants
/// - Runs are append-only; terminal statuses never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet started.
    Pending,
    /// Cells are executing.
    Running,
    /// All cells completed and metrics were verified.
    Succeeded,
    /// Execution failed with a typed code.
    Failed,
}

/// Plan synthesis state.
///
/// # Invariants
/// - `Validated` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    /// Stage 1 produced a reasoning draft.
    DraftReasoned,
    /// Stage 2 shaped the draft into candidate JSON.
    DraftShaped,
    /// The sanitizer normalized the candidate.
    Sanitized,
    /// Final schema validation passed; terminal success.
    Validated,
    /// Synthesis failed; terminal failure.
    Rejected,
}

// ============================================================================
// SECTION: Uploads
// ============================================================================

/// Format tag for a user-uploaded dataset file.
///
/// # Invariants
/// - Variants map 1:1 to accepted file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadFormat {
    /// Comma-separated values.
    Csv,
    /// Excel workbook (xlsx).
    Xlsx,
    /// Legacy Excel workbook (xls).
    Xls,
}

impl UploadFormat {
    /// Returns the file extension for the format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
        }
    }

    /// Parses a format tag from a file extension, case-insensitively.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            _ => None,
        }
    }
}

/// Descriptor for a dataset blob uploaded alongside a paper.
///
/// # Invariants
/// - Persisted atomically with the owning paper row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetUpload {
    /// Blob store path of the uploaded file.
    pub blob_path: String,
    /// Format tag derived from the original filename.
    pub format: UploadFormat,
    /// Original filename as supplied by the uploader.
    pub original_filename: String,
}

impl DatasetUpload {
    /// Returns the filename stem without its extension.
    #[must_use]
    pub fn filename_stem(&self) -> &str {
        self.original_filename
            .rsplit_once('.')
            .map_or(self.original_filename.as_str(), |(stem, _)| stem)
    }
}

// ============================================================================
// SECTION: Paper
// ============================================================================

/// A paper under reproduction.
///
/// # Invariants
/// - `checksum` is unique; two ingests of the same bytes yield the same row.
/// - `index_handle` is unique once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Paper identifier.
    pub id: PaperId,
    /// Human title.
    pub title: String,
    /// Original source URL when ingested by URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Blob store path of the PDF.
    pub pdf_path: String,
    /// SHA-256 checksum of the PDF bytes, lowercase hex.
    pub checksum: String,
    /// Provider-side searchable index handle once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_handle: Option<IndexHandle>,
    /// Optional dataset upload descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_upload: Option<DatasetUpload>,
    /// Current pipeline stage.
    pub stage: Stage,
    /// Current status within the stage.
    pub status: PaperStatus,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last mutation timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Claim
// ============================================================================

/// A quantitative claim extracted from a paper.
///
/// # Invariants
/// - `source_citation` is non-empty.
/// - `confidence` is within `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim identifier.
    pub id: ClaimId,
    /// Owning paper.
    pub paper_id: PaperId,
    /// Dataset name as written in the paper.
    pub dataset_name: String,
    /// Split tag when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
    /// Metric name.
    pub metric_name: String,
    /// Metric value as written; no percent normalization is applied.
    pub metric_value: f64,
    /// Units field; "%", "s", or empty.
    #[serde(default)]
    pub units: String,
    /// Short method description when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_snippet: Option<String>,
    /// Citation locating the claim in the paper.
    pub source_citation: String,
    /// Extractor confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Dataset format tag when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_format: Option<String>,
    /// Target column name when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    /// Preprocessing notes when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessing_notes: Option<String>,
    /// Dataset URL when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_url: Option<String>,
}

// ============================================================================
// SECTION: Plan Record
// ============================================================================

/// A persisted plan with its synthesis state.
///
/// # Invariants
/// - `env_fingerprint` is set only after a successful materialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Plan identifier.
    pub id: PlanId,
    /// Owning paper.
    pub paper_id: PaperId,
    /// The validated plan document.
    pub document: PlanV11,
    /// Environment fingerprint from the last materialize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_fingerprint: Option<String>,
    /// Synthesis state.
    pub state: PlanState,
    /// Verbose Stage-1 reasoning text kept for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last mutation timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// A single sandboxed notebook execution.
///
/// # Invariants
/// - Runs are append-only; a failed run is never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,
    /// Owning plan.
    pub plan_id: PlanId,
    /// Owning paper.
    pub paper_id: PaperId,
    /// Run status.
    pub status: RunStatus,
    /// Seed applied to the notebook PRNGs.
    pub seed: i64,
    /// Environment fingerprint inherited from the plan.
    pub env_fingerprint: String,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Execution start timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// Execution completion timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Wall-clock duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Typed failure code when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Failure message when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ============================================================================
// SECTION: Run Event
// ============================================================================

/// A persisted run event.
///
/// # Invariants
/// - `seq` is monotonic within the owning run; insertion order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEventRecord {
    /// Owning run.
    pub run_id: RunId,
    /// Monotonic sequence number within the run.
    pub seq: u64,
    /// Event timestamp.
    pub at: Timestamp,
    /// Event type label.
    pub event_type: String,
    /// Structured payload.
    pub payload: Value,
}
