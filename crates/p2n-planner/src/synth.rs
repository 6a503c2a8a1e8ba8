// crates/p2n-planner/src/synth.rs
// ============================================================================
// Module: Plan Synthesis
// Description: Two-stage reasoner/shaper orchestration over the harness.
// Purpose: Produce a sanitized Plan v1.1 from selected claims and a budget.
// Dependencies: crate::{error, sanitize, schema, toolbox}, p2n-agents, p2n-core
// ============================================================================

//! ## Overview
//! Synthesis is two-stage by design: the reasoner decides with research tools
//! bound, the shaper conforms the decision to the Plan v1.1 schema, and the
//! deterministic sanitizer has the final word. Shaping failures walk a fixed
//! ladder: a second shaper attempt, one JSON rescue, a direct parse of the
//! reasoner output, then a typed two-stage failure.
//!
//! Invariants:
//! - The reasoner tool loop is bounded; hosted-tool caps are enforced by the
//!   harness underneath.
//! - The rescue pass runs at most once per synthesis.

// ============================================================================
// SECTION: Imports
// ============================================================================

use p2n_agents::AgentHarness;
use p2n_agents::AgentRequest;
use p2n_agents::AgentResponse;
use p2n_agents::ProviderEvent;
use p2n_agents::ToolSpec;
use p2n_agents::extract_json_object;
use p2n_core::Claim;
use p2n_core::IndexHandle;
use p2n_core::Paper;
use p2n_core::plan::MAX_REQUEST_BUDGET_MINUTES;
use p2n_registry::DatasetRegistry;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::PlanError;
use crate::sanitize::SanitizeContext;
use crate::sanitize::SanitizeOutcome;
use crate::sanitize::sanitize;
use crate::schema::plan_v11_schema;
use crate::schema::shaper_contract;
use crate::toolbox::ToolTranscriptEntry;
use crate::toolbox::budget_estimator_contract;
use crate::toolbox::dataset_resolver_contract;
use crate::toolbox::execute_tool;
use crate::toolbox::license_checker_contract;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on reasoner tool-execution rounds.
const MAX_TOOL_ROUNDS: u32 = 3;
/// Shaper attempts before the rescue pass.
const SHAPER_ATTEMPTS: u32 = 2;

/// Instructions for the planning reasoner.
const REASONER_INSTRUCTIONS: &str =
    "You design a CPU-only reproduction of quantitative claims from a research paper. Search the \
     paper for the experimental setup and quote it verbatim for every decision you make. Use \
     dataset_resolver before committing to a dataset, license_checker for its license tag, and \
     budget_estimator to keep training inside the stated budget. Prefer the smallest setup that \
     can reproduce the claim.";

/// Instructions for the plan shaper.
const SHAPER_INSTRUCTIONS: &str =
    "You convert a reproduction strategy into a single Plan v1.1 JSON document. Call emit_plan \
     exactly once with a document matching the schema. Do not invent facts that are absent from \
     the strategy or tool results.";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Planner model and behavior configuration.
///
/// # Invariants
/// - Model identifiers are non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    /// Model for the reasoner role.
    pub reasoner_model: String,
    /// Model for the shaper role.
    pub shaper_model: String,
    /// Sampling temperature for the shaper; the reasoner uses the model's own.
    pub shaper_temperature: f64,
    /// Output token ceiling per response.
    pub max_output_tokens: u32,
    /// Whether the shaper pass is enabled.
    pub two_stage_enabled: bool,
    /// Maximum results per hosted file-search call.
    pub file_search_max_results: u32,
}

// ============================================================================
// SECTION: Input and Outcome
// ============================================================================

/// Input to one synthesis.
///
/// # Invariants
/// - `claims` is non-empty and owned by `paper`.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    /// Owning paper.
    pub paper: &'a Paper,
    /// Selected claims.
    pub claims: &'a [Claim],
    /// Provider-side index handle for file search.
    pub index: &'a IndexHandle,
    /// Requested budget in minutes.
    pub requested_budget_minutes: u32,
}

/// How the draft that reached the sanitizer was obtained.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftOrigin {
    /// Shaper output parsed directly.
    Shaped,
    /// Shaper output repaired by the rescue pass.
    Rescued,
    /// Reasoner output parsed directly.
    ReasonerFallback,
}

/// A successful synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutcome {
    /// The sanitized plan with warnings.
    pub sanitized: SanitizeOutcome,
    /// Verbose stage-one reasoning text, kept for display.
    pub reasoning: String,
    /// Executed stage-one tool transcript.
    pub transcript: Vec<ToolTranscriptEntry>,
    /// How the sanitized draft was obtained.
    pub origin: DraftOrigin,
}

// ============================================================================
// SECTION: Synthesizer
// ============================================================================

/// Two-stage plan synthesizer over the agent harness.
///
/// # Invariants
/// - Holds no per-run state; every synthesis carries its own trackers.
pub struct PlanSynthesizer<'a> {
    /// Agent harness with caps and rescue configured.
    harness: &'a AgentHarness,
    /// Dataset registry shared with the sanitizer.
    registry: &'a DatasetRegistry,
    /// Planner configuration.
    config: PlannerConfig,
}

impl<'a> PlanSynthesizer<'a> {
    /// Creates a synthesizer over the harness and registry.
    #[must_use]
    pub const fn new(
        harness: &'a AgentHarness,
        registry: &'a DatasetRegistry,
        config: PlannerConfig,
    ) -> Self {
        Self {
            harness,
            registry,
            config,
        }
    }

    /// Synthesizes a sanitized plan from the selected claims.
    ///
    /// Stage-one events are forwarded to `events` when provided.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] for input violations, policy refusals, model
    /// faults, and sanitizer rejections.
    pub async fn synthesize(
        &self,
        input: SynthesisInput<'_>,
        events: Option<mpsc::Sender<ProviderEvent>>,
    ) -> Result<SynthesisOutcome, PlanError> {
        if input.requested_budget_minutes == 0 {
            return Err(PlanError::InvalidBudget);
        }
        if input.requested_budget_minutes > MAX_REQUEST_BUDGET_MINUTES {
            return Err(PlanError::BudgetExceedsPolicy(input.requested_budget_minutes));
        }
        if input.claims.is_empty() {
            return Err(PlanError::NoClaimsSelected);
        }

        let (reasoning, transcript) = self.reason(&input, events).await?;
        let (draft, origin) = if self.config.two_stage_enabled {
            self.shape(&reasoning, &transcript).await?
        } else {
            (parse_draft_from_text(&reasoning)?, DraftOrigin::ReasonerFallback)
        };

        let ctx = SanitizeContext {
            registry: self.registry,
            paper: input.paper,
            claims: input.claims,
            requested_budget_minutes: input.requested_budget_minutes,
        };
        let sanitized = sanitize(&draft, &ctx)?;
        Ok(SynthesisOutcome {
            sanitized,
            reasoning,
            transcript,
            origin,
        })
    }

    /// Runs the stage-one reasoner with its bounded tool loop.
    async fn reason(
        &self,
        input: &SynthesisInput<'_>,
        events: Option<mpsc::Sender<ProviderEvent>>,
    ) -> Result<(String, Vec<ToolTranscriptEntry>), PlanError> {
        let mut transcript: Vec<ToolTranscriptEntry> = Vec::new();
        let mut prompt = render_claims_prompt(input);
        let mut reasoning = String::new();

        for _round in 0..MAX_TOOL_ROUNDS {
            let request = AgentRequest {
                model: self.config.reasoner_model.clone(),
                instructions: REASONER_INSTRUCTIONS.to_string(),
                input: prompt.clone(),
                // The reasoner is governed by the underlying model.
                temperature: 1.0,
                max_output_tokens: self.config.max_output_tokens,
                tools: self.reasoner_tools(input.index),
            };
            let response = self.harness.run(&request, events.clone()).await?;
            if !response.text.is_empty() {
                if !reasoning.is_empty() {
                    reasoning.push('\n');
                }
                reasoning.push_str(&response.text);
            }
            if response.function_calls.is_empty() {
                break;
            }
            prompt = self.execute_round(&response, input, &mut transcript, &prompt);
        }
        Ok((reasoning, transcript))
    }

    /// Executes one round of function calls and extends the prompt.
    fn execute_round(
        &self,
        response: &AgentResponse,
        input: &SynthesisInput<'_>,
        transcript: &mut Vec<ToolTranscriptEntry>,
        prompt: &str,
    ) -> String {
        let mut extended = prompt.to_string();
        extended.push_str("\n\nTool results:\n");
        for call in &response.function_calls {
            let result = execute_tool(&call.name, &call.arguments, self.registry, input.paper);
            extended.push_str(&format!("- {}({}) -> {}\n", call.name, call.arguments, result));
            transcript.push(ToolTranscriptEntry {
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
                result,
            });
        }
        extended
    }

    /// Returns the stage-one tool list.
    fn reasoner_tools(&self, index: &IndexHandle) -> Vec<ToolSpec> {
        vec![
            ToolSpec::FileSearch {
                index: index.clone(),
                max_results: self.config.file_search_max_results,
            },
            ToolSpec::WebSearch,
            ToolSpec::Function {
                contract: dataset_resolver_contract(),
            },
            ToolSpec::Function {
                contract: license_checker_contract(),
            },
            ToolSpec::Function {
                contract: budget_estimator_contract(),
            },
        ]
    }

    /// Runs the stage-two shaper with the fixed failure ladder.
    async fn shape(
        &self,
        reasoning: &str,
        transcript: &[ToolTranscriptEntry],
    ) -> Result<(Value, DraftOrigin), PlanError> {
        let contract = shaper_contract();
        let request = AgentRequest {
            model: self.config.shaper_model.clone(),
            instructions: SHAPER_INSTRUCTIONS.to_string(),
            input: render_shaper_prompt(reasoning, transcript),
            temperature: self.config.shaper_temperature,
            max_output_tokens: self.config.max_output_tokens,
            tools: vec![ToolSpec::Function {
                contract: contract.clone(),
            }],
        };

        let mut last_raw = String::new();
        for _attempt in 0..SHAPER_ATTEMPTS {
            let response = self.harness.run(&request, None).await?;
            let raw = response
                .function_calls
                .iter()
                .find(|call| call.name == contract.name)
                .map(|call| call.arguments.clone())
                .or_else(|| extract_json_object(&response.text).map(ToString::to_string));
            if let Some(raw) = raw {
                if let Ok(value) = serde_json::from_str::<Value>(&raw) {
                    return Ok((value, DraftOrigin::Shaped));
                }
                last_raw = raw;
            }
        }

        if !last_raw.is_empty()
            && let Ok(rescued) = self.harness.rescue_json(&last_raw, &contract).await
            && let Ok(value) = serde_json::from_str::<Value>(&rescued)
        {
            return Ok((value, DraftOrigin::Rescued));
        }

        parse_draft_from_text(reasoning)
            .map(|value| (value, DraftOrigin::ReasonerFallback))
            .map_err(|_| {
                PlanError::TwoStageFailed(
                    "shaper, rescue, and reasoner fallback all failed".to_string(),
                )
            })
    }
}

// ============================================================================
// SECTION: Prompt Rendering
// ============================================================================

/// Renders the selected claims and budget into the reasoner prompt.
fn render_claims_prompt(input: &SynthesisInput<'_>) -> String {
    let mut prompt = format!(
        "Paper: {}\nBudget: {} minutes of CPU-only execution.\n\nSelected claims:\n",
        input.paper.title, input.requested_budget_minutes
    );
    for claim in input.claims {
        prompt.push_str(&format!(
            "- dataset \"{}\", metric {} = {}{}, citation \"{}\", confidence {}\n",
            claim.dataset_name,
            claim.metric_name,
            claim.metric_value,
            claim.units,
            claim.source_citation,
            claim.confidence,
        ));
        if let Some(target) = &claim.target_column {
            prompt.push_str(&format!("  target column: \"{target}\"\n"));
        }
    }
    if let Some(upload) = &input.paper.dataset_upload {
        prompt.push_str(&format!(
            "\nThe paper carries an uploaded dataset file \"{}\" ({}).\n",
            upload.original_filename,
            upload.format.extension()
        ));
    }
    prompt.push_str("\nProduce a reproduction strategy, quoting the paper for each decision.");
    prompt
}

/// Renders the shaper prompt from the reasoning and tool transcript.
fn render_shaper_prompt(reasoning: &str, transcript: &[ToolTranscriptEntry]) -> String {
    let mut prompt = format!("Reproduction strategy:\n{reasoning}\n");
    if !transcript.is_empty() {
        prompt.push_str("\nExecuted tool calls:\n");
        for entry in transcript {
            prompt.push_str(&format!(
                "- {}({}) -> {}\n",
                entry.tool, entry.arguments, entry.result
            ));
        }
    }
    prompt.push_str(&format!(
        "\nPlan v1.1 schema:\n{}\n\nCall emit_plan exactly once with the finished document.",
        plan_v11_schema()
    ));
    prompt
}

/// Parses a plan draft object out of free-form reasoner text.
fn parse_draft_from_text(text: &str) -> Result<Value, PlanError> {
    let object = extract_json_object(text)
        .ok_or_else(|| PlanError::TwoStageFailed("reasoner output carries no JSON".to_string()))?;
    serde_json::from_str(object)
        .map_err(|err| PlanError::TwoStageFailed(format!("reasoner JSON failed to parse: {err}")))
}
