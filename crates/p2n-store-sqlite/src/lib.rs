// crates/p2n-store-sqlite/src/lib.rs
// ============================================================================
// Module: Paper2Notebook SQLite Store Library
// Description: Durable metadata store backed by SQLite WAL.
// Purpose: Persist pipeline entities with transactional ownership semantics.
// Dependencies: p2n-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `p2n-store-sqlite` implements the [`p2n_core::MetadataStore`] interface
//! over a single `SQLite` database: papers with their upload descriptors,
//! claims with replace semantics, plans, append-only runs, and per-run event
//! sequences. Ownership cascades through foreign keys so deleting a paper
//! removes everything it owns.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteMetadataStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
