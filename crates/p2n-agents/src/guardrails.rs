// crates/p2n-agents/src/guardrails.rs
// ============================================================================
// Module: Output Guardrails
// Description: Typed predicates over structured agent outputs.
// Purpose: Abort a stage when model output violates a policy predicate.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A guardrail is a named predicate over a typed structured output. Failing
//! guardrails raise a tripwire carrying the guardrail name and message; the
//! pipeline maps tripwires onto user-facing error codes. Guardrails never
//! mutate the value they inspect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Tripwire
// ============================================================================

/// Raised when a guardrail rejects an output.
///
/// # Invariants
/// - `guardrail` names the failing predicate for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("guardrail {guardrail} tripped: {message}")]
pub struct GuardrailTripwire {
    /// Name of the failing guardrail.
    pub guardrail: &'static str,
    /// Human-readable reason.
    pub message: String,
}

// ============================================================================
// SECTION: Guardrail Interface
// ============================================================================

/// A typed predicate over a structured output.
pub trait OutputGuardrail<T>: Send + Sync {
    /// Returns the guardrail name for diagnostics.
    fn name(&self) -> &'static str;

    /// Checks the value, returning a message when it is rejected.
    ///
    /// # Errors
    ///
    /// Returns the rejection message when the predicate fails.
    fn check(&self, value: &T) -> Result<(), String>;
}

/// A guardrail built from a name and a plain function.
///
/// # Invariants
/// - The wrapped function is pure with respect to the checked value.
pub struct FnGuardrail<T> {
    /// Guardrail name.
    name: &'static str,
    /// Predicate function.
    check: fn(&T) -> Result<(), String>,
}

impl<T> FnGuardrail<T> {
    /// Creates a guardrail from a name and predicate function.
    #[must_use]
    pub const fn new(name: &'static str, check: fn(&T) -> Result<(), String>) -> Self {
        Self {
            name,
            check,
        }
    }
}

impl<T: Send + Sync> OutputGuardrail<T> for FnGuardrail<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, value: &T) -> Result<(), String> {
        (self.check)(value)
    }
}

/// Applies guardrails in order, raising on the first failure.
///
/// # Errors
///
/// Returns [`GuardrailTripwire`] for the first failing guardrail.
pub fn apply_guardrails<T>(
    value: &T,
    guardrails: &[&dyn OutputGuardrail<T>],
) -> Result<(), GuardrailTripwire> {
    for guardrail in guardrails {
        if let Err(message) = guardrail.check(value) {
            return Err(GuardrailTripwire {
                guardrail: guardrail.name(),
                message,
            });
        }
    }
    Ok(())
}
