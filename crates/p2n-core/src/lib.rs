// crates/p2n-core/src/lib.rs
// ============================================================================
// Module: Paper2Notebook Core Library
// Description: Canonical types and interfaces for the reproduction pipeline.
// Purpose: Share entities, plan documents, errors, and storage contracts.
// Dependencies: async-trait, rand, serde, serde_json, sha2, thiserror, time
// ============================================================================

//! ## Overview
//! `p2n-core` defines the types the whole Paper2Notebook workspace agrees on:
//! opaque identifiers, the entity records persisted by the metadata store,
//! the permissive plan draft and strict Plan v1.1 documents, the stream-event
//! vocabulary, the typed error taxonomy, hashing helpers, stable asset paths,
//! and the backend-agnostic storage and indexing interfaces.
//!
//! Invariants:
//! - Core types never perform I/O; interfaces define who does.
//! - Wire forms are `snake_case` and append-only.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Module Re-Exports
// ============================================================================

pub use crate::core::hashing;
pub use crate::core::paths;
pub use crate::core::plan;

// ============================================================================
// SECTION: Type Re-Exports
// ============================================================================

pub use crate::core::Claim;
pub use crate::core::ClaimId;
pub use crate::core::DatasetUpload;
pub use crate::core::ErrorCode;
pub use crate::core::ErrorKind;
pub use crate::core::IndexHandle;
pub use crate::core::Justification;
pub use crate::core::JustificationDraft;
pub use crate::core::Paper;
pub use crate::core::PaperId;
pub use crate::core::PaperStatus;
pub use crate::core::PlanConfig;
pub use crate::core::PlanConfigDraft;
pub use crate::core::PlanDataset;
pub use crate::core::PlanDatasetDraft;
pub use crate::core::PlanDraft;
pub use crate::core::PlanId;
pub use crate::core::PlanMetrics;
pub use crate::core::PlanMetricsDraft;
pub use crate::core::PlanModel;
pub use crate::core::PlanModelDraft;
pub use crate::core::PlanPolicy;
pub use crate::core::PlanPolicyDraft;
pub use crate::core::PlanRecord;
pub use crate::core::PlanState;
pub use crate::core::PlanV11;
pub use crate::core::Run;
pub use crate::core::RunEventRecord;
pub use crate::core::RunId;
pub use crate::core::RunStatus;
pub use crate::core::SourceKind;
pub use crate::core::Stage;
pub use crate::core::StreamEvent;
pub use crate::core::Timestamp;
pub use crate::core::TypedError;
pub use crate::core::UploadFormat;
pub use crate::interfaces::BlobError;
pub use crate::interfaces::BlobStore;
pub use crate::interfaces::IndexError;
pub use crate::interfaces::IndexProvider;
pub use crate::interfaces::MetadataStore;
pub use crate::interfaces::SignedRef;
pub use crate::interfaces::StoreError;
