// crates/p2n-core/src/core/paths.rs
// ============================================================================
// Module: Paper2Notebook Asset Paths
// Description: Stable blob store path conventions for papers, plans, and runs.
// Purpose: Keep every producer and consumer of an artifact on one path scheme.
// Dependencies: crate::core::{entity, identifiers, time}
// ============================================================================

//! ## Overview
//! The materializer writes, the executor writes, and the report stage reads;
//! all three meet at these path builders. Paper blobs are partitioned by
//! environment and UTC ingest date; plan and run artifacts are keyed by their
//! identifiers alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::entity::UploadFormat;
use crate::core::identifiers::PaperId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::RunId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Notebook artifact filename under a plan prefix.
pub const NOTEBOOK_FILENAME: &str = "notebook.ipynb";
/// Requirements artifact filename under a plan prefix.
pub const REQUIREMENTS_FILENAME: &str = "requirements.txt";
/// Metrics artifact filename under a run prefix.
pub const METRICS_FILENAME: &str = "metrics.json";
/// Event log artifact filename under a run prefix.
pub const EVENTS_FILENAME: &str = "events.jsonl";
/// Captured log artifact filename under a run prefix.
pub const LOGS_FILENAME: &str = "logs.txt";

// ============================================================================
// SECTION: Paper Paths
// ============================================================================

/// Returns the date-partitioned prefix for a paper blob.
fn paper_prefix(env: &str, ingested_at: Timestamp, paper_id: &PaperId) -> String {
    let (year, month, day) = ingested_at.utc_date_parts();
    format!("papers/{env}/{year:04}/{month:02}/{day:02}/{paper_id}")
}

/// Returns the blob path for a paper PDF.
#[must_use]
pub fn paper_pdf_path(env: &str, ingested_at: Timestamp, paper_id: &PaperId) -> String {
    format!("{}.pdf", paper_prefix(env, ingested_at, paper_id))
}

/// Returns the blob path for a paper's dataset upload.
#[must_use]
pub fn paper_dataset_path(
    env: &str,
    ingested_at: Timestamp,
    paper_id: &PaperId,
    format: UploadFormat,
) -> String {
    format!("{}.dataset.{}", paper_prefix(env, ingested_at, paper_id), format.extension())
}

// ============================================================================
// SECTION: Plan Paths
// ============================================================================

/// Returns the blob path for a plan's notebook artifact.
#[must_use]
pub fn plan_notebook_path(plan_id: &PlanId) -> String {
    format!("plans/{plan_id}/{NOTEBOOK_FILENAME}")
}

/// Returns the blob path for a plan's requirements artifact.
#[must_use]
pub fn plan_requirements_path(plan_id: &PlanId) -> String {
    format!("plans/{plan_id}/{REQUIREMENTS_FILENAME}")
}

// ============================================================================
// SECTION: Run Paths
// ============================================================================

/// Returns the blob path for a run's metrics artifact.
#[must_use]
pub fn run_metrics_path(run_id: &RunId) -> String {
    format!("runs/{run_id}/{METRICS_FILENAME}")
}

/// Returns the blob path for a run's event log artifact.
#[must_use]
pub fn run_events_path(run_id: &RunId) -> String {
    format!("runs/{run_id}/{EVENTS_FILENAME}")
}

/// Returns the blob path for a run's captured log artifact.
#[must_use]
pub fn run_logs_path(run_id: &RunId) -> String {
    format!("runs/{run_id}/{LOGS_FILENAME}")
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

    use super::paper_dataset_path;
    use super::paper_pdf_path;
    use super::plan_notebook_path;
    use super::run_metrics_path;
    use crate::core::entity::UploadFormat;
    use crate::core::identifiers::PaperId;
    use crate::core::identifiers::PlanId;
    use crate::core::identifiers::RunId;
    use crate::core::time::Timestamp;

    /// Tests the PDF path is date-partitioned with zero padding.
    #[test]
    fn pdf_path_is_date_partitioned() {
        // 2024-03-05T12:00:00Z
        let at = Timestamp::from_unix_millis(1_709_640_000_000);
        let path = paper_pdf_path("dev", at, &PaperId::new("abc"));
        assert_eq!(path, "papers/dev/2024/03/05/abc.pdf");
    }

    /// Tests dataset upload paths carry the format extension.
    #[test]
    fn dataset_path_carries_extension() {
        let at = Timestamp::from_unix_millis(1_709_640_000_000);
        let path = paper_dataset_path("dev", at, &PaperId::new("abc"), UploadFormat::Xls);
        assert_eq!(path, "papers/dev/2024/03/05/abc.dataset.xls");
    }

    /// Tests plan and run artifact paths are identifier-keyed.
    #[test]
    fn artifact_paths_are_id_keyed() {
        assert_eq!(plan_notebook_path(&PlanId::new("p1")), "plans/p1/notebook.ipynb");
        assert_eq!(run_metrics_path(&RunId::new("r1")), "runs/r1/metrics.json");
    }
}
