// crates/p2n-notebook/src/generator.rs
// ============================================================================
// Module: Code Generator Contract
// Description: Common contract for dataset and model code emitters.
// Purpose: Keep generators interchangeable behind one interface.
// Dependencies: p2n-core
// ============================================================================

//! ## Overview
//! Every generator answers three questions about a plan: which imports it
//! needs, what top-level code it contributes, and which dependency pins it
//! requires. The builder unions imports and requirements across generators;
//! body order is fixed by the cell skeleton.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::PlanV11;

// ============================================================================
// SECTION: Contract
// ============================================================================

/// A code emitter contributing one cell body to the notebook.
///
/// # Invariants
/// - Output depends only on the plan; generators hold no mutable state.
/// - Emitted code references only names its own imports provide, the seeding
///   cell's globals (`SEED`, `log_event`), or earlier cells in the skeleton.
pub trait CodeGenerator: Send + Sync {
    /// Returns a stable label for diagnostics.
    fn label(&self) -> &'static str;

    /// Returns the import statements the emitted code needs.
    fn imports(&self, plan: &PlanV11) -> Vec<String>;

    /// Returns the top-level code fragment for the plan.
    fn code(&self, plan: &PlanV11) -> String;

    /// Returns the pinned dependency strings the emitted code needs.
    fn requirements(&self, plan: &PlanV11) -> Vec<String>;
}
