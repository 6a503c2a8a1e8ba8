// crates/p2n-pipeline/src/transitions.rs
// ============================================================================
// Module: Stage Transitions
// Description: Legal stage-transition rules for the pipeline state machine.
// Purpose: Refuse stages whose prerequisites have not completed.
// Dependencies: p2n-core
// ============================================================================

//! ## Overview
//! Per paper, stages advance in order with re-entry allowed at extract,
//! plan, and materialize; runs append. A requested stage is legal when the
//! paper has reached the stage immediately before it, or any later one. The
//! verify stage is a placeholder and is always refused.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::ErrorCode;
use p2n_core::Stage;
use p2n_core::TypedError;

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Returns the progression rank of a stage.
const fn stage_rank(stage: Stage) -> u8 {
    match stage {
        Stage::Ingest => 0,
        Stage::Extract => 1,
        Stage::Plan => 2,
        Stage::Materialize => 3,
        Stage::Run => 4,
        Stage::Report => 5,
        Stage::Verify => 6,
    }
}

/// Checks that `requested` is legal from the paper's `current` stage.
///
/// # Errors
///
/// Returns [`ErrorCode::VerifierNotImplemented`] for the placeholder stage
/// and [`ErrorCode::IllegalStageTransition`] for premature requests.
pub fn ensure_transition(current: Stage, requested: Stage) -> Result<(), TypedError> {
    if requested == Stage::Verify {
        return Err(TypedError::new(
            ErrorCode::VerifierNotImplemented,
            "the verify stage is a placeholder",
        ));
    }
    let needed = stage_rank(requested).saturating_sub(1);
    if stage_rank(current) < needed {
        return Err(TypedError::new(
            ErrorCode::IllegalStageTransition,
            format!("cannot enter {} from {}", requested.as_str(), current.as_str()),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
