// crates/p2n-pipeline/src/contracts.rs
// ============================================================================
// Module: Extraction Contracts
// Description: Structured-output contract and guardrails for claim extraction.
// Purpose: Define the extractor's function schema and output policy.
// Dependencies: p2n-agents, p2n-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The extractor emits one structured function call listing every
//! quantitative claim it found. The schema is derived from the typed claim
//! sheet below; guardrails enforce the output policy: at least one claim at
//! or above the confidence floor, and a non-empty citation on every claim.
//! Metric values persist exactly as written; no percent normalization is
//! applied at extraction time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_agents::FunctionContract;
use p2n_agents::OutputGuardrail;
use p2n_agents::schema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

// ============================================================================
// SECTION: Claim Sheet
// ============================================================================

/// One extracted claim as the model reports it.
///
/// # Invariants
/// - `confidence` is within `[0.0, 1.0]` after guardrails pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDraft {
    /// Dataset name as written in the paper.
    pub dataset_name: String,
    /// Split tag when stated.
    #[serde(default)]
    pub split: Option<String>,
    /// Metric name.
    pub metric_name: String,
    /// Metric value as written.
    pub metric_value: f64,
    /// Units field; "%", "s", or empty.
    #[serde(default)]
    pub units: String,
    /// Short method description when stated.
    #[serde(default)]
    pub method_snippet: Option<String>,
    /// Citation locating the claim.
    pub source_citation: String,
    /// Extractor confidence.
    pub confidence: f64,
    /// Dataset format tag when stated.
    #[serde(default)]
    pub dataset_format: Option<String>,
    /// Target column name when stated.
    #[serde(default)]
    pub target_column: Option<String>,
    /// Preprocessing notes when stated.
    #[serde(default)]
    pub preprocessing_notes: Option<String>,
    /// Dataset URL when stated.
    #[serde(default)]
    pub dataset_url: Option<String>,
}

/// The extractor's structured output: every claim found in the paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimSheet {
    /// Claims in document order.
    #[serde(default)]
    pub claims: Vec<ClaimDraft>,
}

// ============================================================================
// SECTION: Contract
// ============================================================================

/// Returns the extractor's structured-output function contract.
#[must_use]
pub fn claim_sheet_contract() -> FunctionContract {
    let claim = schema::object(
        json!({
            "dataset_name": schema::string("Dataset name as written in the paper"),
            "split": schema::string("Split tag when stated"),
            "metric_name": schema::string("Metric name"),
            "metric_value": schema::number("Metric value exactly as written"),
            "units": schema::string("Units: %, s, or empty"),
            "method_snippet": schema::string("Short method description"),
            "source_citation": schema::string("Citation locating the claim"),
            "confidence": schema::number("Extraction confidence in [0, 1]"),
            "dataset_format": schema::string("Dataset format tag when stated"),
            "target_column": schema::string("Target column name when stated"),
            "preprocessing_notes": schema::string("Preprocessing notes when stated"),
            "dataset_url": schema::string("Dataset URL when stated"),
        }),
        &["dataset_name", "metric_name", "metric_value", "source_citation", "confidence"],
    );
    FunctionContract {
        name: "record_claims".to_string(),
        description: "Record every quantitative claim found in the paper.".to_string(),
        parameters: schema::object(
            json!({ "claims": schema::array(claim, "Claims in document order") }),
            &["claims"],
        ),
    }
}

// ============================================================================
// SECTION: Guardrails
// ============================================================================

/// Requires at least one claim at or above the confidence floor.
///
/// # Invariants
/// - `threshold` is within `[0.0, 1.0]`.
pub struct MinConfidenceGuardrail {
    /// Confidence floor.
    pub threshold: f64,
}

impl OutputGuardrail<ClaimSheet> for MinConfidenceGuardrail {
    fn name(&self) -> &'static str {
        "min_confidence_claims"
    }

    fn check(&self, sheet: &ClaimSheet) -> Result<(), String> {
        let qualifying = sheet
            .claims
            .iter()
            .filter(|claim| claim.confidence >= self.threshold)
            .count();
        if qualifying == 0 {
            return Err(format!(
                "no claims at or above the {:.2} confidence floor",
                self.threshold
            ));
        }
        Ok(())
    }
}

/// Requires every claim to carry a non-empty citation and sane confidence.
pub struct WellFormedClaimsGuardrail;

impl OutputGuardrail<ClaimSheet> for WellFormedClaimsGuardrail {
    fn name(&self) -> &'static str {
        "well_formed_claims"
    }

    fn check(&self, sheet: &ClaimSheet) -> Result<(), String> {
        for (index, claim) in sheet.claims.iter().enumerate() {
            if claim.source_citation.trim().is_empty() {
                return Err(format!("claim {index} has an empty citation"));
            }
            if !(0.0..=1.0).contains(&claim.confidence) {
                return Err(format!("claim {index} confidence is outside [0, 1]"));
            }
        }
        Ok(())
    }
}
