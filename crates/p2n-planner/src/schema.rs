// crates/p2n-planner/src/schema.rs
// ============================================================================
// Module: Plan Schema
// Description: Plan v1.1 JSON schema and the shaper function contract.
// Purpose: Keep the normative plan shape in one typed place.
// Dependencies: crate::error, jsonschema, p2n-agents, serde_json
// ============================================================================

//! ## Overview
//! The Plan v1.1 schema is the normative surface consumed by the shaper
//! contract, the sanitizer's final validation, and external clients. It is
//! assembled from typed schema builders so every consumer sees bit-identical
//! structure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use jsonschema::Validator;
use p2n_agents::FunctionContract;
use p2n_agents::schema;
use p2n_core::PlanV11;
use serde_json::Value;
use serde_json::json;

use crate::error::PlanError;

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Returns the Plan v1.1 JSON schema.
#[must_use]
pub fn plan_v11_schema() -> Value {
    let justification = schema::object(
        json!({
            "quote": schema::string("Verbatim quote from the paper"),
            "citation": schema::string("Citation locating the quote"),
        }),
        &["quote", "citation"],
    );
    json!({
        "type": "object",
        "properties": {
            "version": { "type": "string", "const": "1.1" },
            "dataset": schema::object(
                json!({
                    "name": schema::string("Canonical dataset name"),
                    "source": {
                        "type": "string",
                        "enum": ["sklearn", "torchvision", "huggingface", "synthetic", "upload"],
                    },
                    "loader_hints": {
                        "type": "object",
                        "additionalProperties": { "type": "string" },
                    },
                    "train_split": schema::string("Training split name"),
                    "test_split": schema::string("Evaluation split name"),
                }),
                &["name", "source", "train_split", "test_split"],
            ),
            "model": schema::object(
                json!({
                    "name": schema::string("Model name as stated in the paper"),
                    "architecture": schema::string("Architecture family"),
                    "framework": schema::string("Framework tag"),
                }),
                &["name", "architecture", "framework"],
            ),
            "config": schema::object(
                json!({
                    "seed": schema::integer("Random seed"),
                    "batch_size": schema::integer("Mini-batch size"),
                    "epochs": schema::integer("Training epochs"),
                    "learning_rate": schema::number("Learning rate"),
                    "optimizer": schema::string("Optimizer name"),
                    "dropout": schema::number("Dropout probability"),
                    "weight_decay": schema::number("Weight decay"),
                }),
                &["seed", "batch_size", "epochs", "learning_rate", "optimizer"],
            ),
            "metrics": schema::object(
                json!({
                    "primary": schema::string("Primary metric name"),
                    "secondary": schema::array(schema::string("metric name"), "Secondary metrics"),
                    "goal": schema::number("Goal value for the primary metric"),
                    "loss": schema::string("Loss function name"),
                }),
                &["primary", "goal", "loss"],
            ),
            "justifications": {
                "type": "object",
                "properties": {
                    "dataset": justification.clone(),
                    "model": justification.clone(),
                    "config": justification.clone(),
                },
                "required": ["dataset", "model", "config"],
                "additionalProperties": justification,
            },
            "policy": schema::object(
                json!({
                    "budget_minutes": { "type": "integer", "minimum": 1, "maximum": 20 },
                    "license": schema::string("License tag for the dataset"),
                    "cpu_only": { "type": "boolean", "const": true },
                }),
                &["budget_minutes", "license", "cpu_only"],
            ),
            "visualizations": schema::array(schema::string("hint"), "Visualization hints"),
        },
        "required": [
            "version", "dataset", "model", "config", "metrics", "justifications", "policy",
        ],
        "additionalProperties": false,
    })
}

/// Returns the shaper's structured-output function contract.
#[must_use]
pub fn shaper_contract() -> FunctionContract {
    FunctionContract {
        name: "emit_plan".to_string(),
        description: "Emit the final reproduction plan as a single Plan v1.1 object.".to_string(),
        parameters: plan_v11_schema(),
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Returns the compiled schema validator, built once per process.
fn compiled_schema() -> Option<&'static Validator> {
    static VALIDATOR: OnceLock<Option<Validator>> = OnceLock::new();
    VALIDATOR.get_or_init(|| jsonschema::validator_for(&plan_v11_schema()).ok()).as_ref()
}

/// Validates a finished plan document against the Plan v1.1 schema.
///
/// # Errors
///
/// Returns [`PlanError::SchemaInvalid`] with the first violation, or when the
/// embedded schema itself failed to compile.
pub fn validate_plan(plan: &PlanV11) -> Result<(), PlanError> {
    let Some(validator) = compiled_schema() else {
        return Err(PlanError::SchemaInvalid("embedded schema failed to compile".to_string()));
    };
    let document = serde_json::to_value(plan)
        .map_err(|err| PlanError::SchemaInvalid(format!("serialization failed: {err}")))?;
    if let Some(violation) = validator.iter_errors(&document).next() {
        return Err(PlanError::SchemaInvalid(format!(
            "{} at {}",
            violation, violation.instance_path()
        )));
    }
    Ok(())
}
