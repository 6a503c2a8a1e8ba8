// crates/p2n-pipeline/src/report.rs
// ============================================================================
// Module: Gap Reporting
// Description: Claimed-versus-observed comparison for the report stage.
// Purpose: Compute the gap in the representation of the source paper.
// Dependencies: p2n-core, serde
// ============================================================================

//! ## Overview
//! The goal value keeps the representation written in the paper; the
//! observed primary metric is normalized to that representation before the
//! gap is computed. The normalization is a bounded heuristic: only a
//! percent-shaped goal paired with a ratio-shaped observation is rescaled,
//! and the report flags that it happened. Gap percent is
//! `((observed - goal) / goal) * 100`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::interfaces::SignedRef;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Goal values above this are treated as percent-shaped.
const PERCENT_SHAPE_FLOOR: f64 = 1.5;

// ============================================================================
// SECTION: Gap Record
// ============================================================================

/// Claimed-versus-observed gap for one paper.
///
/// # Invariants
/// - `claimed` keeps the representation stored on the plan.
/// - `observed` is reported after any normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapReport {
    /// Primary metric name.
    pub metric: String,
    /// Goal value as stored on the plan.
    pub claimed: f64,
    /// Observed value, normalized to the goal's representation.
    pub observed: f64,
    /// Gap percent relative to the goal.
    pub gap_percent: f64,
    /// True when the observed value was rescaled to match the goal shape.
    pub representation_normalized: bool,
    /// Citations from the claims behind the plan.
    pub citations: Vec<String>,
    /// Short-lived references to the run artifacts.
    pub artifacts: Vec<SignedRef>,
}

// ============================================================================
// SECTION: Gap Computation
// ============================================================================

/// Normalizes an observed value to the goal's representation.
///
/// Returns the adjusted observation and whether a rescale happened. Only the
/// percent-goal/ratio-observation pairing rescales; everything else passes
/// through untouched.
#[must_use]
pub fn normalize_observed(goal: f64, observed: f64) -> (f64, bool) {
    if goal > PERCENT_SHAPE_FLOOR && (0.0..=1.0).contains(&observed) {
        return (observed * 100.0, true);
    }
    (observed, false)
}

/// Computes the gap percent between an observed value and its goal.
#[must_use]
pub fn gap_percent(goal: f64, observed: f64) -> f64 {
    if goal == 0.0 {
        return 0.0;
    }
    (observed - goal) / goal * 100.0
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

    use super::gap_percent;
    use super::normalize_observed;

    /// Tests a ratio observation rescales against a percent goal.
    #[test]
    fn ratio_observation_rescales_to_percent_goal() {
        let (observed, normalized) = normalize_observed(88.1, 0.722);
        assert!(normalized);
        assert!((observed - 72.2).abs() < 1e-9);
        assert!((gap_percent(88.1, observed) - (-18.047_673)).abs() < 1e-3);
    }

    /// Tests matching representations pass through untouched.
    #[test]
    fn matching_representations_pass_through() {
        let (observed, normalized) = normalize_observed(0.881, 0.722);
        assert!(!normalized);
        assert!((observed - 0.722).abs() < f64::EPSILON);

        let (observed, normalized) = normalize_observed(88.1, 72.2);
        assert!(!normalized);
        assert!((observed - 72.2).abs() < f64::EPSILON);
    }

    /// Tests a zero goal yields a zero gap instead of a division blowup.
    #[test]
    fn zero_goal_yields_zero_gap() {
        assert!((gap_percent(0.0, 0.5)).abs() < f64::EPSILON);
    }

    /// Tests the gap sign follows the observation.
    #[test]
    fn gap_sign_follows_observation() {
        assert!(gap_percent(80.0, 88.0) > 0.0);
        assert!(gap_percent(80.0, 72.0) < 0.0);
    }
}
