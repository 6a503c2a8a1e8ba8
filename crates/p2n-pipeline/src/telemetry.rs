// crates/p2n-pipeline/src/telemetry.rs
// ============================================================================
// Module: Pipeline Telemetry
// Description: Observability hooks for stage outcomes and event volumes.
// Purpose: Provide metric events without hard observability dependencies.
// Dependencies: p2n-core
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for stage counters and
//! durations. It is intentionally dependency-light so deployments can plug in
//! their metrics system without redesign; the default sink discards
//! everything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_core::ErrorCode;
use p2n_core::Stage;

// ============================================================================
// SECTION: Metric Events
// ============================================================================

/// Outcome classification for a stage metric event.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Stage completed.
    Ok,
    /// Stage failed with a typed code.
    Error,
}

/// One completed stage observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageMetricEvent {
    /// Stage observed.
    pub stage: Stage,
    /// Outcome classification.
    pub outcome: StageOutcome,
    /// Typed code when the stage failed.
    pub error_code: Option<ErrorCode>,
    /// Stage duration in milliseconds.
    pub duration_ms: u64,
}

// ============================================================================
// SECTION: Sink Interface
// ============================================================================

/// Destination for pipeline metric events.
pub trait MetricsSink: Send + Sync {
    /// Records a completed stage.
    fn stage_completed(&self, event: StageMetricEvent);

    /// Records events published for a run.
    fn run_events_published(&self, count: u64);

    /// Records an artifact truncation.
    fn artifact_truncated(&self, artifact: &'static str);
}

/// Metrics sink that discards every observation.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn stage_completed(&self, _event: StageMetricEvent) {}

    fn run_events_published(&self, _count: u64) {}

    fn artifact_truncated(&self, _artifact: &'static str) {}
}
