// crates/p2n-core/src/interfaces/mod.rs
// ============================================================================
// Module: Paper2Notebook Interfaces
// Description: Backend-agnostic interfaces for metadata, blobs, and indexing.
// Purpose: Define the contract surfaces used by the pipeline stages.
// Dependencies: crate::core, async-trait, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the pipeline integrates with durable storage and the
//! index provider without embedding backend-specific details. Implementations
//! must be deterministic and fail closed on missing or invalid data.
//!
//! Security posture: interface implementations consume untrusted inputs; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::entity::Claim;
use crate::core::entity::Paper;
use crate::core::entity::PaperStatus;
use crate::core::entity::PlanRecord;
use crate::core::entity::Run;
use crate::core::entity::RunEventRecord;
use crate::core::entity::Stage;
use crate::core::identifiers::IndexHandle;
use crate::core::identifiers::PaperId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::RunId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Metadata Store
// ============================================================================

/// Metadata store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed raw row payloads.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found for the requested identifier.
    #[error("not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The backing store reported an error.
    #[error("store failure: {0}")]
    Backend(String),
    /// Stored data failed to deserialize.
    #[error("store corruption: {0}")]
    Corrupt(String),
}

/// Durable metadata store for pipeline entities.
///
/// # Invariants
/// - `replace_claims` is atomic: readers never observe a partial claim set.
/// - `delete_paper` cascades to claims, plans, runs, and events.
/// - `append_run_event` assigns monotonic per-run sequence numbers.
pub trait MetadataStore: Send + Sync {
    /// Inserts a paper row, including any dataset upload descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the checksum already exists.
    fn insert_paper(&self, paper: &Paper) -> Result<(), StoreError>;

    /// Fetches a paper by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the paper does not exist.
    fn get_paper(&self, id: &PaperId) -> Result<Paper, StoreError>;

    /// Looks up a paper by PDF checksum.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure; absence is `Ok(None)`.
    fn find_paper_by_checksum(&self, checksum: &str) -> Result<Option<Paper>, StoreError>;

    /// Updates a paper's stage and status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the paper does not exist.
    fn update_paper_stage(
        &self,
        id: &PaperId,
        stage: Stage,
        status: PaperStatus,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Records the provider-side index handle on a paper.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the paper does not exist.
    fn set_paper_index_handle(
        &self,
        id: &PaperId,
        handle: &IndexHandle,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Deletes a paper and cascades to all owned rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the paper does not exist.
    fn delete_paper(&self, id: &PaperId) -> Result<(), StoreError>;

    /// Replaces the full claim set for a paper in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails; no partial write
    /// survives.
    fn replace_claims(&self, paper_id: &PaperId, claims: &[Claim]) -> Result<(), StoreError>;

    /// Lists claims for a paper in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn list_claims(&self, paper_id: &PaperId) -> Result<Vec<Claim>, StoreError>;

    /// Inserts a plan record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn insert_plan(&self, plan: &PlanRecord) -> Result<(), StoreError>;

    /// Fetches a plan by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the plan does not exist.
    fn get_plan(&self, id: &PlanId) -> Result<PlanRecord, StoreError>;

    /// Lists plans for a paper, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn list_plans(&self, paper_id: &PaperId) -> Result<Vec<PlanRecord>, StoreError>;

    /// Sets the environment fingerprint on a plan after materialize.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the plan does not exist.
    fn set_plan_fingerprint(
        &self,
        id: &PlanId,
        fingerprint: &str,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Inserts a run row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn insert_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Fetches a run by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the run does not exist.
    fn get_run(&self, id: &RunId) -> Result<Run, StoreError>;

    /// Lists runs for a plan, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn list_runs(&self, plan_id: &PlanId) -> Result<Vec<Run>, StoreError>;

    /// Updates a run row in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the run does not exist.
    fn update_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Appends a run event, assigning the next sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn append_run_event(
        &self,
        run_id: &RunId,
        at: Timestamp,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<RunEventRecord, StoreError>;

    /// Lists run events in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    fn list_run_events(&self, run_id: &RunId) -> Result<Vec<RunEventRecord>, StoreError>;
}

// ============================================================================
// SECTION: Blob Store
// ============================================================================

/// Blob store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Blob not found at the requested path.
    #[error("blob not found: {0}")]
    NotFound(String),
    /// Path escaped the store root or used an illegal component.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    /// The backing store reported an I/O error.
    #[error("blob io failure: {0}")]
    Io(String),
}

/// Short-lived signed reference to a stored blob.
///
/// # Invariants
/// - `expires_at` is authoritative; consumers must not cache past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRef {
    /// Blob path the reference grants access to.
    pub path: String,
    /// Opaque access token.
    pub token: String,
    /// Expiry timestamp.
    pub expires_at: Timestamp,
}

/// Durable blob storage addressed by stable paths.
///
/// # Invariants
/// - Writes are atomic at the path level; readers see old or new bytes.
pub trait BlobStore: Send + Sync {
    /// Writes a blob, overwriting any existing bytes at the path.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] on invalid paths or I/O failure.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;

    /// Reads a blob's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::NotFound`] when no blob exists at the path.
    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;

    /// Returns true when a blob exists at the path.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] on invalid paths or I/O failure.
    fn exists(&self, path: &str) -> Result<bool, BlobError>;

    /// Deletes a blob; deleting an absent blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] on invalid paths or I/O failure.
    fn delete(&self, path: &str) -> Result<(), BlobError>;

    /// Issues a short-lived signed reference to a blob.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::NotFound`] when no blob exists at the path.
    fn signed_ref(&self, path: &str, ttl_seconds: u64) -> Result<SignedRef, BlobError>;
}

// ============================================================================
// SECTION: Index Provider
// ============================================================================

/// Index provider errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Index creation failed on the provider side.
    #[error("index creation failed: {0}")]
    Create(String),
    /// Index deletion failed on the provider side.
    #[error("index deletion failed: {0}")]
    Delete(String),
}

/// Provider-side searchable index over a paper PDF.
///
/// The pipeline only stores the returned handle and passes it into the
/// file-search tool; handle contents are never interpreted.
#[async_trait]
pub trait IndexProvider: Send + Sync {
    /// Creates a searchable index over the PDF bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Create`] when the provider rejects the upload.
    async fn create_index(&self, bytes: &[u8], filename: &str) -> Result<IndexHandle, IndexError>;

    /// Deletes a previously created index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Delete`] when the provider rejects the request.
    async fn delete_index(&self, handle: &IndexHandle) -> Result<(), IndexError>;
}
