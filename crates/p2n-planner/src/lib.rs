// crates/p2n-planner/src/lib.rs
// ============================================================================
// Module: Paper2Notebook Planner Library
// Description: Two-stage plan synthesis with a deterministic sanitizer.
// Purpose: Turn selected claims and a budget into a valid Plan v1.1.
// Dependencies: jsonschema, p2n-agents, p2n-core, p2n-registry, serde_json
// ============================================================================

//! ## Overview
//! `p2n-planner` owns plan synthesis end to end: the reasoner pass with its
//! research tools, the shaper pass that conforms output to the Plan v1.1
//! schema, the failure ladder between them, and the deterministic sanitizer
//! that every candidate document must survive. Reasoning models decide;
//! schemas are enforced by machinery, not prompting.
//!
//! Invariants:
//! - The sanitizer is pure and idempotent; it never calls a language model.
//! - An accepted plan's dataset is registry-resolved or upload-backed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod sanitize;
pub mod schema;
pub mod synth;
pub mod toolbox;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::PlanError;
pub use sanitize::SanitizeContext;
pub use sanitize::SanitizeOutcome;
pub use sanitize::sanitize;
pub use schema::plan_v11_schema;
pub use schema::shaper_contract;
pub use schema::validate_plan;
pub use synth::DraftOrigin;
pub use synth::PlanSynthesizer;
pub use synth::PlannerConfig;
pub use synth::SynthesisInput;
pub use synth::SynthesisOutcome;
pub use toolbox::ToolTranscriptEntry;
pub use toolbox::estimate_budget_minutes;
pub use toolbox::execute_tool;
pub use toolbox::license_for;
